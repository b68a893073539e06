//! Pipeline error taxonomy with retry classification.
//!
//! Every way a run can end without a result is represented here. Dispatch
//! asks `retry_category()` instead of matching on messages, and the
//! orchestrator turns any error into a `RejectedArgument` via `reason()` and
//! `run_status()`.
//!
//! ## Retry categories
//!
//! | Category      | Retriable | Bound                    |
//! |---------------|-----------|--------------------------|
//! | Transient     | yes       | `max_transient_retries`  |
//! | ParseFailure  | yes       | `max_malformed_retries`  |
//! | Fatal         | no        | -                        |
//! | Cancelled     | no        | -                        |

use std::fmt;

use debate_coordination::ensemble::{DedupError, QuorumNotReached};
use debate_coordination::registry::RegistryError;
use debate_coordination::types::{RejectionReason, RunStatus, StageName};
use thiserror::Error;

/// Classification used by dispatch to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Timeout or transport error; retry on the next rotated model.
    Transient,
    /// Output failed schema validation; retry once.
    ParseFailure,
    /// Ends the run.
    Fatal,
    /// Run ceiling or caller cancellation; never retried.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::ParseFailure)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::Fatal => write!(f, "fatal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelCallError {
    #[error("{model} timed out after {timeout_ms} ms")]
    Timeout { model: String, timeout_ms: u64 },

    #[error("transport error from {model}: {message}")]
    Transport { model: String, message: String },

    #[error("invalid response from {model}: {message}")]
    InvalidResponse { model: String, message: String },
}

impl ModelCallError {
    pub fn model(&self) -> &str {
        match self {
            Self::Timeout { model, .. }
            | Self::Transport { model, .. }
            | Self::InvalidResponse { model, .. } => model,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("web search is not configured (BRAVE_SEARCH_API_KEY unset)")]
    NotConfigured,

    #[error("search request failed: {0}")]
    Http(String),

    #[error("search response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("embedding response invalid: {0}")]
    InvalidResponse(String),
}

/// Run-level error. Each variant maps to one `RejectionReason`.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("no healthy model available ({pool_size} in pool)")]
    PoolExhausted { pool_size: usize },

    #[error("stage {stage} exceeded its {timeout_ms} ms budget")]
    StageTimeout { stage: StageName, timeout_ms: u64 },

    #[error("run exceeded the {ceiling_ms} ms ceiling")]
    RunTimeout { ceiling_ms: u64 },

    #[error(transparent)]
    QuorumNotReached(#[from] QuorumNotReached),

    #[error("duplicate of sibling {sibling_id} (similarity {similarity:.3})")]
    DuplicateArgument { sibling_id: String, similarity: f64 },

    #[error("malformed output from {model}: {message}")]
    MalformedModelOutput { model: String, message: String },

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("only {got} candidates generated, {need} required")]
    InsufficientCandidates { got: usize, need: usize },

    #[error("no tournament judge returned a vote")]
    NoTournamentVotes,

    #[error("{passing_votes} passing votes, {required} required")]
    QualityGate { passing_votes: usize, required: usize },

    #[error("resilience {resilience:.2} below threshold: {reason}")]
    FailedStressTest { resilience: f64, reason: String },

    #[error(transparent)]
    ModelCall(#[from] ModelCallError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    pub fn malformed(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedModelOutput {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::ModelCall(_) => RetryCategory::Transient,
            Self::MalformedModelOutput { .. } => RetryCategory::ParseFailure,
            Self::Cancelled(_) | Self::RunTimeout { .. } => RetryCategory::Cancelled,
            _ => RetryCategory::Fatal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    pub fn reason(&self) -> RejectionReason {
        match self {
            Self::PoolExhausted { .. } => RejectionReason::PoolExhausted,
            Self::StageTimeout { .. } => RejectionReason::StageTimeout,
            Self::RunTimeout { .. } => RejectionReason::RunTimeout,
            Self::QuorumNotReached(_) => RejectionReason::QuorumNotReached,
            Self::DuplicateArgument { .. } => RejectionReason::DuplicateOfSibling,
            Self::MalformedModelOutput { .. } => RejectionReason::MalformedModelOutput,
            Self::InvalidContext(_) => RejectionReason::InvalidContext,
            Self::InsufficientCandidates { .. } => RejectionReason::InsufficientCandidates,
            Self::NoTournamentVotes => RejectionReason::NoTournamentVotes,
            Self::QualityGate { .. } => RejectionReason::QualityGate,
            Self::FailedStressTest { .. } => RejectionReason::FailedStressTest,
            Self::ModelCall(_) => RejectionReason::ModelUnavailable,
            Self::Embedding(_) => RejectionReason::EmbeddingFailed,
            Self::Cancelled(_) => RejectionReason::Cancelled,
        }
    }

    /// Terminal run status this error produces.
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::DuplicateArgument { .. } | Self::QualityGate { .. } | Self::FailedStressTest { .. } => {
                RunStatus::Rejected
            }
            Self::StageTimeout { .. } | Self::RunTimeout { .. } => RunStatus::TimedOut,
            _ => RunStatus::Failed,
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::PoolExhausted { pool_size } => Self::PoolExhausted { pool_size },
            RegistryError::UnknownModel(name) => Self::ModelCall(ModelCallError::Transport {
                message: "model is not registered".into(),
                model: name,
            }),
        }
    }
}

impl From<DedupError> for PipelineError {
    fn from(err: DedupError) -> Self {
        Self::Embedding(EmbedError::InvalidResponse(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_call_failure_is_transient() {
        let err = PipelineError::from(ModelCallError::Timeout {
            model: "qwen2.5:latest".into(),
            timeout_ms: 60_000,
        });
        assert!(err.is_retriable());
        assert_eq!(err.retry_category(), RetryCategory::Transient);
        assert_eq!(err.reason(), RejectionReason::ModelUnavailable);
        assert_eq!(err.run_status(), RunStatus::Failed);
    }

    #[test]
    fn malformed_output_is_parse_failure() {
        let err = PipelineError::malformed("gemma2:latest", "text too short");
        assert_eq!(err.retry_category(), RetryCategory::ParseFailure);
        assert_eq!(err.reason().as_str(), "malformed model output");
    }

    #[test]
    fn pool_exhausted_is_fatal() {
        let err = PipelineError::from(RegistryError::PoolExhausted { pool_size: 7 });
        assert!(!err.is_retriable());
        assert_eq!(err.reason(), RejectionReason::PoolExhausted);
    }

    #[test]
    fn duplicate_is_benign_rejection() {
        let err = PipelineError::DuplicateArgument {
            sibling_id: "s1".into(),
            similarity: 0.9,
        };
        assert_eq!(err.run_status(), RunStatus::Rejected);
        assert_eq!(err.reason().to_string(), "duplicate of sibling");
    }

    #[test]
    fn timeouts_produce_timed_out_status() {
        let stage = PipelineError::StageTimeout {
            stage: StageName::Tournament,
            timeout_ms: 90_000,
        };
        let run = PipelineError::RunTimeout {
            ceiling_ms: 600_000,
        };
        assert_eq!(stage.run_status(), RunStatus::TimedOut);
        assert_eq!(run.run_status(), RunStatus::TimedOut);
        assert_eq!(run.retry_category(), RetryCategory::Cancelled);
        assert!(!stage.is_retriable());
    }

    #[test]
    fn quorum_failure_keeps_counts() {
        let err = PipelineError::from(QuorumNotReached {
            responded: 2,
            required: 3,
        });
        assert_eq!(err.reason(), RejectionReason::QuorumNotReached);
        assert!(err.to_string().contains("2 judges responded"));
    }
}
