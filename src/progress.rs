//! Terminal progress for reconciliation passes.
//!
//! One bar per namespace; passes run on different threads so every bar is
//! owned by a shared `MultiProgress`.

use crate::ui;
use colored::Colorize;
use converge::{Action, PassReport, ProgressCallback, ReconciliationResult};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const TEMPLATE: &str = "{spinner:.green} {prefix:.bold} [{bar:20.cyan/blue}] {pos}/{len} {msg}";

pub struct PassProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    hidden: bool,
}

impl PassProgress {
    pub fn new(hidden: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            hidden,
        }
    }

    fn bar(&self, namespace: &str) -> Option<ProgressBar> {
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl ProgressCallback for PassProgress {
    fn on_pass_start(&self, namespace: &str, actions: usize) {
        let bar = if self.hidden {
            ProgressBar::hidden()
        } else {
            let bar = self.multi.add(ProgressBar::new(actions as u64));
            bar.set_style(Self::style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        bar.set_prefix(namespace.to_string());
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace.to_string(), bar);
    }

    fn on_action_start(&self, namespace: &str, action: &Action) {
        if let Some(bar) = self.bar(namespace) {
            bar.set_message(action.to_string());
        }
    }

    fn on_action_complete(&self, namespace: &str, result: &ReconciliationResult) {
        let Some(bar) = self.bar(namespace) else {
            return;
        };
        bar.inc(1);
        if !result.success && !self.hidden {
            let line = format!(
                "  {} {}: {}",
                ui::state_symbol(result.state),
                result.action,
                result.error.as_deref().unwrap_or("failed").dimmed()
            );
            // printing above the bars keeps them intact
            if let Err(e) = self.multi.println(line) {
                log::debug!("Failed to print progress line: {e}");
            }
        }
    }

    fn on_pass_complete(&self, report: &PassReport) {
        if let Some(bar) = self.bar(&report.namespace) {
            let summary = ui::summary_line(&report.summary());
            if report.is_success() {
                bar.finish_with_message(summary.green().to_string());
            } else {
                bar.finish_with_message(summary.yellow().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use converge::{ActionKind, Target};

    fn failed_result() -> ReconciliationResult {
        let action = Action::new(ActionKind::Delete, Target::new("old", "web"), None, "pruned");
        ReconciliationResult::not_started(action, "pass deadline expired")
    }

    #[test]
    fn test_failed_action_is_printed_without_panicking() {
        let progress = PassProgress::new(false);
        progress.on_pass_start("web", 1);
        progress.on_action_complete("web", &failed_result());

        let bar = progress.bar("web").unwrap();
        assert_eq!(bar.position(), 1);
    }

    #[test]
    fn test_events_for_unknown_namespace_are_ignored() {
        let progress = PassProgress::new(true);
        progress.on_action_complete("web", &failed_result());
        progress.on_pass_complete(&PassReport::failed("web", 1, Utc::now(), "forbidden"));

        assert!(progress.bar("web").is_none());
    }
}
