//! Pipeline state machine: explicit states and legal transition guards.
//!
//! Every run starts `Idle`, walks the nine stages in order and terminates
//! in `Done`, `Rejected`, `TimedOut` or `Failed`. Stages disabled for the
//! run's tier are still entered (and logged as skipped), so the stage
//! sequence is the same for every run. Each transition is recorded with
//! its elapsed time for diagnostics.

use std::fmt;

use debate_coordination::types::{RunStatus, StageName};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "kebab-case")]
pub enum PipelineState {
    Idle,
    Stage(StageName),
    /// A result was produced. Terminal.
    Done,
    Rejected,
    TimedOut,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Rejected | Self::TimedOut | Self::Failed
        )
    }

    /// Terminal state for a run that ended without a result.
    pub fn from_run_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Rejected => Self::Rejected,
            RunStatus::TimedOut => Self::TimedOut,
            RunStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Stage(stage) => write!(f, "{stage}"),
            Self::Done => write!(f, "DONE"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// ```text
/// Idle → context-extraction
/// stage N → stage N+1
/// final-refinement → Done
/// any non-terminal → Rejected | TimedOut | Failed
/// ```
fn is_legal_transition(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;

    if matches!(to, Rejected | TimedOut | Failed) && !from.is_terminal() {
        return true;
    }

    match (from, to) {
        (Idle, Stage(StageName::ContextExtraction)) => true,
        (Stage(StageName::FinalRefinement), Done) => true,
        (Stage(current), Stage(next)) => current.next() == Some(next),
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal pipeline transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

pub struct StateMachine {
    current: PipelineState,
    started_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Idle,
            started_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    /// The stage currently executing, if any.
    pub fn current_stage(&self) -> Option<StageName> {
        match self.current {
            PipelineState::Stage(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn advance(
        &mut self,
        to: PipelineState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "Pipeline transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.elapsed_ms(),
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Move to the terminal state for `status`.
    pub fn terminate(&mut self, status: RunStatus, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(PipelineState::from_run_status(status), Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `IDLE → <current> (Nms, K transitions)`.
    pub fn summary(&self) -> String {
        format!(
            "{} → {} ({}ms, {} transitions)",
            PipelineState::Idle,
            self.current,
            self.elapsed_ms(),
            self.transitions.len()
        )
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
