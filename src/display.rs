//! Plan and pass-report display

use crate::ui;
use colored::Colorize;
use converge::{Action, ActionKind, DiffSummary, PassReport};

/// Detail shown after the target in plan listings
fn action_detail(action: &Action) -> String {
    match &action.kind {
        ActionKind::Create => action
            .spec
            .as_ref()
            .map(|s| format!("{} ×{}", s.image, s.replicas))
            .unwrap_or_default(),
        ActionKind::UpdateImage { image } => format!("→ {image}"),
        ActionKind::Scale { delta, replicas } => format!("→ {replicas} replicas ({delta:+})"),
        ActionKind::Delete => "(will remove)".to_string(),
    }
}

/// Display per-namespace plans
///
/// A namespace whose state could not be observed is listed with its error.
pub fn display_plan(plans: &[(String, converge::Result<Vec<Action>>)]) {
    let all: Vec<Action> = plans
        .iter()
        .filter_map(|(_, actions)| actions.as_ref().ok())
        .flatten()
        .cloned()
        .collect();
    let unobserved = plans.iter().filter(|(_, actions)| actions.is_err()).count();
    if all.is_empty() && unobserved == 0 {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deployment Plan".bold()
    );
    println!("│");

    for (namespace, actions) in plans {
        match actions {
            Err(e) => {
                println!("│ {} {}", namespace.bold(), "(not observed)".red());
                println!("│   {} {}", "✗".red(), e.to_string().dimmed());
            }
            Ok(actions) if actions.is_empty() => {
                println!("│ {} {}", namespace.bold(), "(in sync)".dimmed());
            }
            Ok(actions) => {
                println!("│ {}", namespace.bold());
                for action in actions {
                    println!(
                        "│   {} {:<30} {}",
                        ui::action_symbol(&action.kind),
                        action.target.name,
                        action_detail(action).dimmed()
                    );
                }
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_actions(&all);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} create, {} image, {} scale, {} delete)",
        summary.total().to_string().bold(),
        summary.creates.to_string().green(),
        summary.image_updates.to_string().cyan(),
        summary.scales.to_string().yellow(),
        summary.deletes.to_string().red()
    );
    if unobserved > 0 {
        println!(
            "│ {} namespace(s) could not be observed",
            unobserved.to_string().red()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display one stored or fresh pass report
pub fn display_report(report: &PassReport, verbose: bool) {
    let status = if report.is_success() {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "  {} {} {}",
        status,
        report.namespace.bold(),
        format!(
            "(pass {}, {})",
            report.pass_id,
            report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .dimmed()
    );

    if let Some(error) = &report.error {
        println!("    {} {}", "✗".red(), error.dimmed());
        return;
    }

    if report.results.is_empty() {
        ui::dim("    No actions needed");
        return;
    }

    for result in &report.results {
        if result.success && !verbose {
            continue;
        }
        let mut line = format!(
            "    {} {}",
            ui::state_symbol(result.state),
            result.action
        );
        if result.attempts > 1 {
            line.push_str(&format!(" [{} attempts]", result.attempts));
        }
        println!("{line}");
        if let Some(error) = &result.error {
            let kind = result
                .error_kind
                .map(|k| format!("{k}: "))
                .unwrap_or_default();
            ui::dim(&format!("      {kind}{error}"));
        }
    }

    if report.timed_out {
        ui::dim("    Pass timed out before all actions started");
    }
    ui::dim(&format!("    {}", ui::summary_line(&report.summary())));
}
