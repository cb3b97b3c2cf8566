//! Observable state of the agent loop.

use std::sync::Mutex;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use beesto_core::{AgentState, AgentStep, IgnoreLock as _, StepStatus};

/// Point-in-time view of the agent store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    /// Current run state
    pub state: AgentState,
    /// Whether a run is in flight
    pub is_processing: bool,
    /// Steps of the current plan
    pub plan: Vec<AgentStep>,
    /// Step being executed
    pub current_step_id: Option<String>,
    /// Run log in order
    pub logs: Vec<String>,
    /// Final report, pretty-printed when it was JSON
    pub report: Option<String>,
}

impl AgentSnapshot {
    /// Moves to `next` if the lifecycle allows it.
    ///
    /// Rejected transitions are logged and leave the state unchanged.
    pub fn transition(&mut self, next: AgentState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!("Rejected agent transition {} -> {}", self.state, next);
            return false;
        }
        self.state = next;
        true
    }

    /// Sets a plan step's status.
    pub fn set_step_status(&mut self, step_id: &str, status: StepStatus) -> bool {
        match self.plan.iter_mut().find(|step| step.id == step_id) {
            Some(step) => {
                step.status = status;
                true
            }
            None => false,
        }
    }

    /// Appends a line to a plan step's own log.
    pub fn add_step_log(&mut self, step_id: &str, line: impl Into<String>) {
        if let Some(step) = self.plan.iter_mut().find(|step| step.id == step_id) {
            step.logs.push(line.into());
        }
    }
}

/// Shared agent state.
///
/// Runs mutate it through [`Self::update`], which refuses once the run's token is
/// cancelled; the check and the mutation happen under the same lock, so a reset
/// that follows a cancellation is never overwritten by the cancelled run.
#[derive(Debug, Default)]
pub struct AgentStore {
    inner: Mutex<AgentSnapshot>,
}

impl AgentStore {
    /// Creates an idle store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> AgentSnapshot {
        self.inner.lock_ignore_poison().clone()
    }

    /// Current run state.
    pub fn state(&self) -> AgentState {
        self.inner.lock_ignore_poison().state
    }

    /// Whether a run is in flight.
    pub fn is_processing(&self) -> bool {
        self.inner.lock_ignore_poison().is_processing
    }

    /// Steps of the current plan.
    pub fn plan(&self) -> Vec<AgentStep> {
        self.inner.lock_ignore_poison().plan.clone()
    }

    /// Step being executed.
    pub fn current_step_id(&self) -> Option<String> {
        self.inner.lock_ignore_poison().current_step_id.clone()
    }

    /// Run log.
    pub fn logs(&self) -> Vec<String> {
        self.inner.lock_ignore_poison().logs.clone()
    }

    /// Final report.
    pub fn report(&self) -> Option<String> {
        self.inner.lock_ignore_poison().report.clone()
    }

    /// Appends a log line.
    pub fn add_log(&self, line: impl Into<String>) {
        self.inner.lock_ignore_poison().logs.push(line.into());
    }

    /// Applies `update` unless `cancel` has fired, returning its result.
    pub fn update<R>(
        &self,
        cancel: &CancellationToken,
        update: impl FnOnce(&mut AgentSnapshot) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock_ignore_poison();
        if cancel.is_cancelled() {
            return None;
        }
        Some(update(&mut inner))
    }

    /// Returns to the initial idle state.
    pub fn reset(&self) {
        *self.inner.lock_ignore_poison() = AgentSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_is_ignored() {
        let mut snapshot = AgentSnapshot::default();
        assert!(snapshot.transition(AgentState::Analyzing));
        assert!(snapshot.transition(AgentState::Executing));
        assert!(!snapshot.transition(AgentState::Planning));
        assert_eq!(snapshot.state, AgentState::Executing);
        assert!(snapshot.transition(AgentState::Failed));
        assert!(!snapshot.transition(AgentState::Completed));
    }

    #[test]
    fn test_step_updates() {
        let mut snapshot = AgentSnapshot {
            plan: vec![AgentStep::new("step-1", "Create page", "")],
            ..AgentSnapshot::default()
        };
        assert!(snapshot.set_step_status("step-1", StepStatus::Running));
        assert!(!snapshot.set_step_status("step-9", StepStatus::Running));
        snapshot.add_step_log("step-1", "Applied 2 file changes");

        assert_eq!(snapshot.plan[0].status, StepStatus::Running);
        assert_eq!(snapshot.plan[0].logs, ["Applied 2 file changes"]);
    }

    #[test]
    fn test_cancelled_updates_are_dropped() {
        let store = AgentStore::new();
        let cancel = CancellationToken::new();
        store.update(&cancel, |snapshot| snapshot.logs.push("kept".to_owned()));

        cancel.cancel();
        let applied = store.update(&cancel, |snapshot| snapshot.logs.push("dropped".to_owned()));

        assert!(applied.is_none());
        assert_eq!(store.logs(), ["kept"]);
    }

    #[test]
    fn test_reset() {
        let store = AgentStore::new();
        store.update(&CancellationToken::new(), |snapshot| {
            snapshot.is_processing = true;
            snapshot.report = Some("done".to_owned());
            snapshot.transition(AgentState::Analyzing)
        });
        store.reset();
        assert_eq!(store.snapshot(), AgentSnapshot::default());
    }
}
