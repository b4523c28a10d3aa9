//! `berth diff` - preview what apply would change

use anyhow::Result;
use converge::{ExitStatus, Reconciler};

use crate::cli::DiffArgs;
use crate::config::{BerthConfig, Overrides};
use crate::display;
use crate::ui;

use super::{load_specs, targets_single_service};

pub fn run(config: &BerthConfig, args: DiffArgs) -> Result<ExitStatus> {
    ui::header("Deployment Diff");

    let specs = load_specs(&args.spec, args.target.as_deref())?;
    if specs.is_empty() {
        ui::warn("No applications match the target");
        return Ok(ExitStatus::Success);
    }

    let mut options = config.reconcile_options(Overrides {
        prune: args.prune,
        ..Overrides::default()
    });
    if targets_single_service(args.target.as_deref()) {
        options.prune = false;
    }

    let reconciler = Reconciler::new(config.kubectl_client()?, options);
    let plans = reconciler.plan_all(&specs);
    display::display_plan(&plans);

    if plans.iter().any(|(_, actions)| actions.is_err()) {
        return Ok(ExitStatus::ActionsFailed);
    }
    Ok(ExitStatus::Success)
}
