//! Agent event channel for observers of a run.
//! Every store mutation performed by a run is mirrored here so a UI can follow along.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::agent::{AgentState, Phase, StepStatus};

/// Event emitted while an agent run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentEvent {
    /// The run moved to a new state
    StateChanged {
        /// Previous state
        from: AgentState,
        /// New state
        to: AgentState,
    },
    /// A line was appended to the run log
    Log(String),
    /// A plan step changed status
    StepStatus {
        /// Step id
        step_id: String,
        /// New status
        status: StepStatus,
    },
    /// A streamed fragment arrived for a phase
    Fragment {
        /// Phase producing the fragment
        phase: Phase,
        /// Text fragment
        text: String,
    },
}

/// Sending half of the agent event channel.
///
/// A closed receiver is logged and otherwise ignored: observers are optional.
#[derive(Clone, Debug)]
pub struct AgentChannel {
    /// Sender delivering events to the observer
    sender: mpsc::UnboundedSender<AgentEvent>,
}

impl AgentChannel {
    /// Creates a channel and its receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Creates a channel from an existing sender.
    pub fn from_sender(sender: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { sender }
    }

    /// Sends an event.
    pub fn send(&self, event: AgentEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!("Failed to send agent event: {}", error);
        }
    }

    /// Sends a state change.
    pub fn state_changed(&self, from: AgentState, to: AgentState) {
        self.send(AgentEvent::StateChanged { from, to });
    }

    /// Sends a log line.
    pub fn log(&self, line: impl Into<String>) {
        self.send(AgentEvent::Log(line.into()));
    }

    /// Sends a step status change.
    pub fn step_status(&self, step_id: impl Into<String>, status: StepStatus) {
        self.send(AgentEvent::StepStatus {
            step_id: step_id.into(),
            status,
        });
    }

    /// Sends a streamed fragment.
    pub fn fragment(&self, phase: Phase, text: impl Into<String>) {
        self.send(AgentEvent::Fragment {
            phase,
            text: text.into(),
        });
    }
}
