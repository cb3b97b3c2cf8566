//! The analyze, plan, execute, report loop.
//!
//! Each phase is one streamed request to the phase endpoint. Fragments are
//! forwarded to the chat transcript as they arrive, the accumulated text is mined
//! for JSON, and every outcome lands in the [`AgentStore`]. Phases and plan steps
//! run strictly one after another.

use core::mem;
use std::sync::{Arc, Mutex};

use serde_json::{Value, to_string_pretty};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use beesto_core::extract::extract_json;
use beesto_core::{
    AgentChannel, AgentState, ChatTranscript, Error, IgnoreLock as _, Phase, PhaseEndpoint,
    PhaseRequest, Plan, RequestContext, Result, Role, StepStatus, collect_phase,
};

use crate::applier::WorkspaceApplier;
use crate::changes::parse_changes;
use crate::store::{AgentSnapshot, AgentStore};

/// Drives agent runs against a phase endpoint.
pub struct AgentOrchestrator {
    endpoint: Arc<dyn PhaseEndpoint>,
    store: Arc<AgentStore>,
    applier: Arc<WorkspaceApplier>,
    transcript: Arc<ChatTranscript>,
    channel: Option<AgentChannel>,
    /// Token of the most recent run
    active_run: Mutex<CancellationToken>,
}

impl AgentOrchestrator {
    /// Creates an orchestrator.
    pub fn new(
        endpoint: Arc<dyn PhaseEndpoint>,
        store: Arc<AgentStore>,
        applier: Arc<WorkspaceApplier>,
        transcript: Arc<ChatTranscript>,
    ) -> Self {
        Self {
            endpoint,
            store,
            applier,
            transcript,
            channel: None,
            active_run: Mutex::new(CancellationToken::new()),
        }
    }

    /// Mirrors every store mutation onto `channel`.
    #[must_use]
    pub fn with_channel(mut self, channel: AgentChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// The agent store updated by runs.
    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    /// The chat transcript receiving streamed fragments.
    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    /// Runs the whole loop for one user request and returns the final state.
    ///
    /// Starting a run supersedes any run still in flight. A run cancelled by
    /// [`Self::rollback`] stops at its next suspension point and returns
    /// [`AgentState::Idle`] without touching the store again.
    pub async fn run(&self, user_request: &str) -> AgentState {
        let cancel = CancellationToken::new();
        let previous = {
            let mut active = self.active_run.lock_ignore_poison();
            mem::replace(&mut *active, cancel.clone())
        };
        previous.cancel();

        let run = Run {
            orchestrator: self,
            cancel,
            user_request,
        };
        run.update(|snapshot| {
            *snapshot = AgentSnapshot {
                is_processing: true,
                ..AgentSnapshot::default()
            };
        });
        self.transcript.add_message(Role::User, user_request);
        self.transcript.add_message(Role::Assistant, "");
        self.transcript.set_last_message_streaming(true);
        info!("Starting agent run");

        let outcome = run.execute().await;
        if run.cancel.is_cancelled() {
            info!("Agent run cancelled");
            return AgentState::Idle;
        }
        self.transcript.set_last_message_streaming(false);

        match outcome {
            Ok(()) => {
                run.transition(AgentState::Completed);
                run.update(|snapshot| snapshot.is_processing = false);
                run.log("Agent loop completed");
            }
            Err(error) => {
                warn!("Agent run failed: {error}");
                run.log(format!("Error: {error}"));
                run.transition(AgentState::Failed);
                run.update(|snapshot| snapshot.is_processing = false);
            }
        }
        self.store.state()
    }

    /// Cancels the current run and resets the store to idle.
    pub fn rollback(&self) {
        self.active_run.lock_ignore_poison().cancel();
        let previous = self.store.state();
        self.store.reset();
        self.store.add_log("Rolled back agent changes");
        self.transcript.set_last_message_streaming(false);
        if let Some(channel) = &self.channel {
            if previous != AgentState::Idle {
                channel.state_changed(previous, AgentState::Idle);
            }
            channel.log("Rolled back agent changes");
        }
        info!("Rolled back agent run");
    }
}

/// One run's view of the orchestrator; every mutation checks the run's token.
struct Run<'run> {
    orchestrator: &'run AgentOrchestrator,
    cancel: CancellationToken,
    user_request: &'run str,
}

impl Run<'_> {
    fn update<R>(&self, update: impl FnOnce(&mut AgentSnapshot) -> R) -> Option<R> {
        self.orchestrator.store.update(&self.cancel, update)
    }

    fn channel(&self) -> Option<&AgentChannel> {
        self.orchestrator.channel.as_ref()
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        if self.update(|snapshot| snapshot.logs.push(line.clone())).is_some() {
            info!("{line}");
            if let Some(channel) = self.channel() {
                channel.log(line);
            }
        }
    }

    fn transition(&self, next: AgentState) {
        let from = self.update(|snapshot| {
            let from = snapshot.state;
            snapshot.transition(next).then_some(from)
        });
        if let Some(Some(from)) = from
            && let Some(channel) = self.channel()
        {
            channel.state_changed(from, next);
        }
    }

    fn set_step_status(&self, step_id: &str, status: StepStatus) {
        let changed = self.update(|snapshot| {
            snapshot.current_step_id = (status == StepStatus::Running).then(|| step_id.to_owned());
            snapshot.set_step_status(step_id, status)
        });
        if changed == Some(true)
            && let Some(channel) = self.channel()
        {
            channel.step_status(step_id, status);
        }
    }

    fn step_log(&self, step_id: &str, line: String) {
        self.update(|snapshot| snapshot.add_step_log(step_id, line));
    }

    fn forward(&self, phase: Phase, fragment: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.orchestrator.transcript.append_to_last_message(fragment);
        if let Some(channel) = self.channel() {
            channel.fragment(phase, fragment);
        }
    }

    fn context(&self) -> RequestContext {
        RequestContext {
            file_structure: self.orchestrator.applier.tree().file_paths(),
        }
    }

    /// Sends one phase request and drains its stream.
    async fn phase(&self, request: PhaseRequest) -> Result<String> {
        let phase = request.phase;
        let events = self
            .orchestrator
            .endpoint
            .request(&request, self.cancel.clone())
            .await?;
        collect_phase(events, |fragment| self.forward(phase, fragment)).await
    }

    /// Extracts the JSON payload of a phase, logging a warning when there is none.
    fn payload(&self, text: &str, label: &str) -> Option<Value> {
        let payload = extract_json(text);
        if payload.is_none() {
            self.log(format!("Warning: Could not parse {label} JSON"));
        }
        payload
    }

    async fn execute(&self) -> Result<()> {
        self.orchestrator.applier.tree().refresh_tree().await;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.transition(AgentState::Analyzing);
        self.log("Analyzing request...");
        let request = PhaseRequest::new(Phase::Analyze, self.user_request).with_context(self.context());
        let analysis_text = self.phase(request).await?;
        let analysis = self.payload(&analysis_text, "analysis");

        self.transition(AgentState::Planning);
        self.log("Creating execution plan...");
        let request = PhaseRequest::new(Phase::Plan, self.user_request)
            .with_context(self.context())
            .with_analysis(analysis);
        let plan_text = self.phase(request).await?;
        let plan = match self.payload(&plan_text, "plan") {
            Some(payload) => {
                let plan = Plan::from_payload(&payload);
                if plan.is_none() {
                    warn!("Plan response carried no steps");
                    self.log("Warning: Could not parse plan JSON");
                }
                plan
            }
            None => None,
        };
        if let Some(plan) = &plan {
            self.update(|snapshot| snapshot.plan.clone_from(&plan.steps));
        }

        if let Some(plan) = plan.as_ref().filter(|plan| !plan.is_empty()) {
            self.execute_plan(plan).await?;
        }
        self.report(plan).await
    }

    async fn execute_plan(&self, plan: &Plan) -> Result<()> {
        self.transition(AgentState::Executing);
        self.log(format!("Executing {} steps...", plan.steps.len()));

        for step in &plan.steps {
            self.log(format!("Executing step: {}", step.title));
            self.set_step_status(&step.id, StepStatus::Running);

            let request = PhaseRequest::new(Phase::Execute, self.user_request)
                .with_context(self.context())
                .with_plan(Some(plan.clone()))
                .with_step(step.clone());
            let response = match self.phase(request).await {
                Ok(response) => response,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => {
                    warn!("Step {} failed: {error}", step.id);
                    self.step_log(&step.id, error.to_string());
                    self.log(format!("Error executing step: {}", step.title));
                    self.set_step_status(&step.id, StepStatus::Failed);
                    continue;
                }
            };
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let parsed = parse_changes(&response);
            if parsed.rejected > 0 {
                self.step_log(
                    &step.id,
                    format!("Warning: Skipped {} malformed file changes", parsed.rejected),
                );
                self.log(format!("Warning: Could not parse changes for step: {}", step.title));
            }
            match self.orchestrator.applier.apply(&parsed.changes).await {
                Ok(applied) => {
                    self.step_log(&step.id, format!("Applied {applied} file changes"));
                    self.set_step_status(&step.id, StepStatus::Completed);
                    self.log(format!("Completed step: {}", step.title));
                }
                Err(error) => {
                    warn!("Applying changes for step {} failed: {error}", step.id);
                    self.step_log(&step.id, error.to_string());
                    self.log(format!("Error applying changes for step: {}", step.title));
                    self.set_step_status(&step.id, StepStatus::Failed);
                }
            }
        }
        self.update(|snapshot| snapshot.current_step_id = None);
        Ok(())
    }

    /// Requests the report; failures other than cancellation are logged and skipped.
    async fn report(&self, plan: Option<Plan>) -> Result<()> {
        self.transition(AgentState::Testing);
        self.log("Generating report...");
        let request = PhaseRequest::new(Phase::Report, self.user_request).with_plan(plan);
        match self.phase(request).await {
            Ok(text) => {
                let report = extract_json(&text)
                    .and_then(|value| to_string_pretty(&value).ok())
                    .unwrap_or(text);
                self.update(|snapshot| snapshot.report = Some(report));
                Ok(())
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(error) => {
                warn!("Report generation failed: {error}");
                Ok(())
            }
        }
    }
}
