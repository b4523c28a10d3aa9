//! Execution engine - applies actions with retry and cancellation
//!
//! Every action runs through an explicit [`ActionRun`] state machine:
//!
//! ```text
//! Pending -> InProgress -> Succeeded
//!                      \-> Failed
//! ```
//!
//! `InProgress` loops on itself for each retry of a transient failure.
//! Terminal states never transition again.

use crate::cancel::PassDeadline;
use crate::client::{ClusterClient, ClusterResult};
use crate::context::ProgressCallback;
use crate::error::ClusterError;
use crate::retry::{RetryCallback, RetryConfig};
use crate::types::{Action, ActionKind, ActionState, ReconciliationResult};

/// State machine for one action
#[derive(Debug, Clone)]
pub struct ActionRun {
    action: Action,
    state: ActionState,
    attempts: u32,
    error: Option<ClusterError>,
    note: Option<String>,
}

impl ActionRun {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            state: ActionState::Pending,
            attempts: 0,
            error: None,
            note: None,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Move to `to` if the transition is allowed; returns whether it happened
    pub fn transition(&mut self, to: ActionState) -> bool {
        let allowed = matches!(
            (self.state, to),
            (ActionState::Pending | ActionState::InProgress, ActionState::InProgress)
                | (
                    ActionState::InProgress,
                    ActionState::Succeeded | ActionState::Failed
                )
        );
        if allowed {
            self.state = to;
        }
        allowed
    }

    /// Start an attempt; counts it
    pub fn begin_attempt(&mut self) -> bool {
        if !self.transition(ActionState::InProgress) {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn succeed(&mut self) -> bool {
        if !self.transition(ActionState::Succeeded) {
            return false;
        }
        self.error = None;
        true
    }

    pub fn fail(&mut self, error: ClusterError) -> bool {
        if !self.transition(ActionState::Failed) {
            return false;
        }
        self.error = Some(error);
        true
    }

    /// Fail with an extra note appended to the error detail
    pub fn fail_with_note(&mut self, error: ClusterError, note: impl Into<String>) -> bool {
        if !self.fail(error) {
            return false;
        }
        self.note = Some(note.into());
        true
    }

    pub fn into_result(self) -> ReconciliationResult {
        let error_kind = self.error.as_ref().map(|e| e.kind);
        let error = self.error.map(|e| match self.note {
            Some(note) => format!("{e} ({note})"),
            None => e.to_string(),
        });
        ReconciliationResult {
            success: self.state == ActionState::Succeeded,
            action: self.action,
            state: self.state,
            attempts: self.attempts,
            error,
            error_kind,
        }
    }
}

/// Issue the cluster call behind one action
fn issue<C: ClusterClient + ?Sized>(client: &C, action: &Action) -> ClusterResult<()> {
    let target = &action.target;
    match &action.kind {
        ActionKind::Create => {
            let spec = action.spec.as_ref().ok_or_else(|| {
                ClusterError::permanent(format!("create {target} has no spec attached"))
            })?;
            client.create_service(spec)
        }
        ActionKind::Scale { replicas, .. } => {
            client.scale_service(&target.name, &target.namespace, *replicas)
        }
        ActionKind::UpdateImage { image } => {
            client.update_image(&target.name, &target.namespace, image)
        }
        ActionKind::Delete => client.delete_service(&target.name, &target.namespace),
    }
}

/// Apply a single action
///
/// Transient failures are retried with exponential backoff until the
/// retry budget is spent or the deadline expires; permanent failures
/// end the action after that attempt.
pub fn apply<C: ClusterClient + ?Sized>(
    client: &C,
    action: &Action,
    retry: &RetryConfig,
    deadline: &PassDeadline,
    callback: &dyn RetryCallback,
) -> ReconciliationResult {
    let mut run = ActionRun::new(action.clone());
    let max_attempts = retry.max_attempts();

    while run.begin_attempt() {
        match issue(client, action) {
            Ok(()) => {
                run.succeed();
            }
            Err(err) if !err.is_retryable() => {
                run.fail(err);
            }
            Err(err) if run.attempts() >= max_attempts => {
                run.fail_with_note(err, format!("gave up after {max_attempts} attempts"));
            }
            Err(err) => {
                let delay = retry.delay_for_retry(run.attempts() - 1);
                callback.on_retry(action, run.attempts(), max_attempts, &err, delay);
                if !deadline.sleep(delay) {
                    run.fail_with_note(err, "pass cancelled before retry");
                }
            }
        }
        if run.state().is_terminal() {
            break;
        }
    }

    run.into_result()
}

/// Run a cluster call that is not an action, retrying transient failures
///
/// Follows the same backoff and deadline rules as [`apply`]. Returns the
/// final outcome together with the number of attempts made.
pub fn call_with_retry<T>(
    what: &str,
    retry: &RetryConfig,
    deadline: &PassDeadline,
    mut call: impl FnMut() -> ClusterResult<T>,
) -> (ClusterResult<T>, u32) {
    let max_attempts = retry.max_attempts();
    let mut attempts = 0;
    loop {
        attempts += 1;
        match call() {
            Err(err) if err.is_retryable() && attempts < max_attempts => {
                let delay = retry.delay_for_retry(attempts - 1);
                log::warn!(
                    "{what}: attempt {attempts}/{max_attempts} failed: {err}. Retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                if !deadline.sleep(delay) {
                    return (Err(err), attempts);
                }
            }
            outcome => return (outcome, attempts),
        }
    }
}

fn cancel_reason(deadline: &PassDeadline) -> &'static str {
    if deadline.timed_out() {
        "cancelled: pass timeout exceeded"
    } else {
        "cancelled"
    }
}

/// Execute a pass's actions in order
///
/// Failures do not stop the pass; later actions still run. Once the
/// deadline expires no further action starts, and the rest are recorded
/// as not started.
pub fn execute_actions<C: ClusterClient + ?Sized>(
    client: &C,
    namespace: &str,
    actions: Vec<Action>,
    retry: &RetryConfig,
    deadline: &PassDeadline,
    progress: &dyn ProgressCallback,
    callback: &dyn RetryCallback,
) -> Vec<ReconciliationResult> {
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let result = if deadline.is_expired() {
            log::warn!("{action}: not started, {}", cancel_reason(deadline));
            ReconciliationResult::not_started(action, cancel_reason(deadline))
        } else {
            progress.on_action_start(namespace, &action);
            let result = apply(client, &action, retry, deadline, callback);
            match &result.error {
                None => log::info!("{action}: succeeded after {} attempt(s)", result.attempts),
                Some(error) => log::warn!("{action}: failed: {error}"),
            }
            result
        };
        progress.on_action_complete(namespace, &result);
        results.push(result);
    }

    results
}
