//! Agent run state: phases, steps and plans.

use core::fmt;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// No run in progress; initial state and the reset target
    #[default]
    Idle,
    /// Request is being analyzed
    Analyzing,
    /// Execution plan is being produced
    Planning,
    /// Plan steps are being executed
    Executing,
    /// Report is being generated
    Testing,
    /// Run finished
    Completed,
    /// Run aborted on an unrecoverable error
    Failed,
}

impl AgentState {
    /// Position along the forward phase sequence. `Failed` sits outside it.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Analyzing => Some(1),
            Self::Planning => Some(2),
            Self::Executing => Some(3),
            Self::Testing => Some(4),
            Self::Completed => Some(5),
            Self::Failed => None,
        }
    }

    /// Whether the run has reached a terminal state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Checks whether moving from `self` to `next` respects the phase ordering.
    ///
    /// Transitions only move forward; any non-terminal state may fail. Returning to
    /// `Idle` is reserved for a reset and is never a valid transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "IDLE",
            Self::Analyzing => "ANALYZING",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Testing => "TESTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        formatter.write_str(label)
    }
}

/// Phase requested from the model-backed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Understand the request
    Analyze,
    /// Break the request into steps
    Plan,
    /// Carry out one plan step
    Execute,
    /// Summarise the run
    Report,
}

impl Phase {
    /// Agent state entered while this phase runs.
    pub const fn state(self) -> AgentState {
        match self {
            Self::Analyze => AgentState::Analyzing,
            Self::Plan => AgentState::Planning,
            Self::Execute => AgentState::Executing,
            Self::Report => AgentState::Testing,
        }
    }

    /// Wire name sent in the request body.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Execute => "execute",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Analyze => "Analysis",
            Self::Plan => "Planning",
            Self::Execute => "Execution",
            Self::Report => "Report",
        };
        formatter.write_str(label)
    }
}

/// Execution status of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Not started
    #[default]
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Endpoint or change application failed
    Failed,
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    /// Identifier, unique within the plan
    pub id: String,
    /// Short human-readable title
    pub title: String,
    /// What the step should accomplish
    #[serde(default)]
    pub description: String,
    /// Current status
    #[serde(default)]
    pub status: StepStatus,
    /// Log lines recorded while the step ran
    #[serde(default)]
    pub logs: Vec<String>,
}

impl AgentStep {
    /// Creates a pending step.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: StepStatus::Pending,
            logs: Vec::new(),
        }
    }
}

/// Ordered steps produced once per run by the planning phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Steps in execution order
    pub steps: Vec<AgentStep>,
}

impl Plan {
    /// Builds a plan from the structured planning payload.
    ///
    /// Expects `{"steps": [...]}`. Entries without a title are dropped. Missing or
    /// repeated ids are synthesised from the position. Returns `None` when no
    /// `steps` array exists.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let entries = payload.get("steps")?.as_array()?;
        let mut seen = HashSet::new();
        let steps = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let title = entry.get("title").and_then(Value::as_str)?;
                let proposed = match entry.get("id") {
                    Some(Value::String(id)) => Some(id.clone()),
                    Some(Value::Number(id)) => Some(id.to_string()),
                    _ => None,
                };
                let id = unique_step_id(&mut seen, proposed, index);
                let description = entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(AgentStep::new(id, title, description))
            })
            .collect();
        Some(Self { steps })
    }

    /// Returns `true` when the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Keeps `proposed` unless it was already used, falling back to `step-<n>`.
fn unique_step_id(seen: &mut HashSet<String>, proposed: Option<String>, index: usize) -> String {
    let position = index + 1;
    let mut id = proposed
        .filter(|id| !seen.contains(id))
        .unwrap_or_else(|| format!("step-{position}"));
    let mut suffix = 2_usize;
    while seen.contains(&id) {
        id = format!("step-{position}-{suffix}");
        suffix += 1;
    }
    seen.insert(id.clone());
    id
}

/// Project context attached to phase requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Paths of every file currently in the project tree
    pub file_structure: Vec<String>,
}

/// Body of one phase endpoint request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRequest {
    /// Requested phase
    pub phase: Phase,
    /// The user's original request
    pub user_request: String,
    /// Project context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    /// Structured analysis from the analyze phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    /// The full plan, for execute and report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// The step being executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<AgentStep>,
}

impl PhaseRequest {
    /// Creates a request carrying only the phase and user request.
    pub fn new(phase: Phase, user_request: impl Into<String>) -> Self {
        Self {
            phase,
            user_request: user_request.into(),
            context: None,
            analysis: None,
            plan: None,
            step: None,
        }
    }

    /// Attaches project context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches the analysis payload.
    #[must_use]
    pub fn with_analysis(mut self, analysis: Option<Value>) -> Self {
        self.analysis = analysis;
        self
    }

    /// Attaches the plan.
    #[must_use]
    pub fn with_plan(mut self, plan: Option<Plan>) -> Self {
        self.plan = plan;
        self
    }

    /// Attaches the step being executed.
    #[must_use]
    pub fn with_step(mut self, step: AgentStep) -> Self {
        self.step = Some(step);
        self
    }
}
