//! `berth status` - show the last recorded pass per namespace

use anyhow::{Context as AnyhowContext, Result};
use converge::{ExitStatus, PassReport};

use crate::Context;
use crate::cli::StatusArgs;
use crate::config::BerthConfig;
use crate::display;
use crate::state::BerthState;
use crate::ui;

/// Length of the fingerprint prefix shown in listings
const SHORT_FINGERPRINT: usize = 12;

pub fn run(ctx: &Context, config: &BerthConfig, args: &StatusArgs) -> Result<ExitStatus> {
    let state = BerthState::load(&config.state_dir())?;
    let reports = selected_reports(&state, args.namespace.as_deref());

    if args.json {
        let json =
            serde_json::to_string_pretty(&reports).context("Failed to serialize pass reports")?;
        println!("{json}");
        return Ok(ExitStatus::from_reports(&reports));
    }

    ui::header("Reconciliation Status");

    if reports.is_empty() {
        println!();
        match &args.namespace {
            Some(ns) => ui::info(&format!("No passes recorded for namespace '{ns}'")),
            None => ui::info("No passes recorded yet. Run 'berth apply' first."),
        }
        return Ok(ExitStatus::Success);
    }

    if let Some(updated) = state.last_updated {
        ui::kv("Last updated", &updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }

    for report in &reports {
        println!();
        display::display_report(report, ctx.verbose > 0);
        if let Some(ns) = state.namespace(&report.namespace) {
            let short: String = ns.fingerprint.chars().take(SHORT_FINGERPRINT).collect();
            ui::dim(&format!("  from {} ({short})", ns.source));
        }
    }

    Ok(ExitStatus::from_reports(&reports))
}

fn selected_reports(state: &BerthState, namespace: Option<&str>) -> Vec<PassReport> {
    state
        .namespaces
        .iter()
        .filter(|(name, _)| namespace.is_none_or(|ns| ns == name.as_str()))
        .map(|(_, ns)| ns.report.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(namespace: &str) -> PassReport {
        PassReport {
            namespace: namespace.to_string(),
            pass_id: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            timed_out: false,
            error: None,
            results: Vec::new(),
        }
    }

    #[test]
    fn test_selected_reports_filter() {
        let mut state = BerthState::default();
        state.record(report("web"), "apps.toml", "aaa");
        state.record(report("swim"), "apps.toml", "bbb");

        assert_eq!(selected_reports(&state, None).len(), 2);

        let swim = selected_reports(&state, Some("swim"));
        assert_eq!(swim.len(), 1);
        assert_eq!(swim[0].namespace, "swim");

        assert!(selected_reports(&state, Some("missing")).is_empty());
    }
}
