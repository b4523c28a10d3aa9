//! `berth apply` - converge the cluster to the declared state

use anyhow::{Context as AnyhowContext, Result};
use converge::{
    ApplicationSpec, AuditLog, ClusterClient, ExitStatus, LeaseRegistry, PassSummary,
    ProgressCallback, Reconciler, group_by_namespace, loader,
};
use std::collections::HashMap;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::{BerthConfig, Overrides};
use crate::display;
use crate::progress::PassProgress;
use crate::state::BerthState;
use crate::ui;

use super::{load_specs, targets_single_service};

/// How far an apply goes after showing the plan
#[derive(Debug, Clone, Copy)]
pub(crate) struct ApplyMode {
    pub dry_run: bool,
    pub confirm: bool,
}

pub fn run(ctx: &Context, config: &BerthConfig, args: ApplyArgs) -> Result<ExitStatus> {
    ui::header("Applying Deployment Spec");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let specs = load_specs(&args.spec, args.target.as_deref())?;
    if specs.is_empty() {
        ui::warn("No applications match the target");
        return Ok(ExitStatus::Success);
    }

    let mut options = config.reconcile_options(Overrides {
        timeout_secs: args.timeout,
        jobs: args.jobs,
        prune: args.prune,
    });
    // other services in the namespace are filtered out, not undeclared
    if options.prune && targets_single_service(args.target.as_deref()) {
        ui::warn("Pruning is disabled when targeting a single service");
        options.prune = false;
    }

    let state_dir = config.state_dir();
    let previous = BerthState::load(&state_dir)?;
    let audit = AuditLog::with_file(&BerthState::audit_file(&state_dir))
        .context("Failed to open audit log")?;

    let client = config.kubectl_client()?;
    let reconciler = Reconciler::new(client, options)
        .with_audit_log(audit)
        .with_leases(LeaseRegistry::with_lock_dir(BerthState::locks_dir(&state_dir)))
        .with_first_pass_id(previous.last_pass_id() + 1);

    let mode = ApplyMode {
        dry_run: args.dry_run,
        confirm: !args.yes,
    };
    let progress = PassProgress::new(ctx.quiet);
    let source = args.spec.display().to_string();
    let mut recorded = BerthState::default();
    let status = plan_and_apply(&reconciler, &specs, mode, &progress, &mut recorded, &source)?;

    if !recorded.namespaces.is_empty() {
        BerthState::merge_into(&state_dir, &recorded)?;
        print_summary(&recorded, &specs, ctx.verbose > 0);
    }
    Ok(status)
}

/// Show the plan, then reconcile unless there is nothing to do
///
/// Namespaces that could not be observed while planning are shown with
/// their error; passes still run for every namespace.
pub(crate) fn plan_and_apply<C: ClusterClient>(
    reconciler: &Reconciler<C>,
    specs: &[ApplicationSpec],
    mode: ApplyMode,
    progress: &dyn ProgressCallback,
    recorded: &mut BerthState,
    source: &str,
) -> Result<ExitStatus> {
    let plans = reconciler.plan_all(specs);
    display::display_plan(&plans);

    let unobserved = plans.iter().any(|(_, actions)| actions.is_err());
    if plans
        .iter()
        .all(|(_, actions)| actions.as_ref().is_ok_and(Vec::is_empty))
    {
        return Ok(ExitStatus::Success);
    }

    if mode.dry_run {
        println!();
        ui::info("Dry run complete - nothing was applied");
        return Ok(if unobserved {
            ExitStatus::ActionsFailed
        } else {
            ExitStatus::Success
        });
    }

    if mode.confirm && !confirm_proceed()? {
        ui::info("Cancelled");
        return Ok(ExitStatus::Success);
    }

    run_passes(reconciler, specs, progress, recorded, source)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    let confirmed = dialoguer::Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Reconcile every namespace and record every pass in `state`
///
/// A namespace whose state cannot be observed is reported, recorded as a
/// failed pass and counted as a failure; the others still run.
pub(crate) fn run_passes<C: ClusterClient>(
    reconciler: &Reconciler<C>,
    specs: &[ApplicationSpec],
    progress: &dyn ProgressCallback,
    state: &mut BerthState,
    source: &str,
) -> Result<ExitStatus> {
    let fingerprints = group_by_namespace(specs)
        .into_iter()
        .map(|plan| Ok((plan.namespace, loader::fingerprint(&plan.specs)?)))
        .collect::<Result<HashMap<_, _>>>()?;

    let mut reports = Vec::new();
    let mut failed_to_start = false;
    let namespaces = group_by_namespace(specs).into_iter().map(|plan| plan.namespace);
    for (namespace, outcome) in namespaces.zip(reconciler.reconcile_all(specs, progress)?) {
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                ui::error(&e.to_string());
                // observe failures leave a failed pass behind; other errors do not
                match reconciler.latest_report(&namespace) {
                    Some(report) if report.error.is_some() => report,
                    _ => {
                        failed_to_start = true;
                        continue;
                    }
                }
            }
        };
        let fingerprint = fingerprints
            .get(&namespace)
            .map(String::as_str)
            .unwrap_or_default();
        state.record(report.clone(), source, fingerprint);
        reports.push(report);
    }

    if failed_to_start {
        return Ok(ExitStatus::ActionsFailed);
    }
    Ok(ExitStatus::from_reports(&reports))
}

/// Print final summary
fn print_summary(state: &BerthState, specs: &[ApplicationSpec], verbose: bool) {
    ui::section("Results");

    let mut total = PassSummary::default();
    let mut failed_passes = 0;
    for plan in group_by_namespace(specs) {
        if let Some(ns) = state.namespace(&plan.namespace) {
            display::display_report(&ns.report, verbose);
            total.merge(&ns.report.summary());
            if ns.report.error.is_some() {
                failed_passes += 1;
            }
        }
    }

    println!();
    if total.is_success() && failed_passes == 0 {
        ui::success(&format!("Apply complete: {}", ui::summary_line(&total)));
    } else if failed_passes > 0 {
        ui::warn(&format!(
            "Apply finished with errors: {}, {failed_passes} namespace(s) not reconciled",
            ui::summary_line(&total)
        ));
    } else {
        ui::warn(&format!(
            "Apply finished with errors: {}",
            ui::summary_line(&total)
        ));
    }
}
