//! Progress event vocabulary for a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ReasoningStrategy, RejectionReason, RunStatus, StageName, StageStatus};

/// Everything a run reports while it progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    StageStart {
        stage: StageName,
        number: u8,
    },

    /// Emitted once per stage, whatever its fate (including skipped).
    StageComplete {
        stage: StageName,
        status: StageStatus,
        elapsed_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    CandidateGenerated {
        candidate_id: Uuid,
        model: String,
        strategy: ReasoningStrategy,
    },

    /// One decided tournament pairing.
    TournamentRound {
        winner: Uuid,
        loser: Uuid,
        votes: usize,
    },

    PipelineComplete {
        argument_id: Uuid,
        quality_score: f64,
        total_duration_ms: u64,
    },

    /// The run ended without a result.
    PipelineError {
        status: RunStatus,
        reason: RejectionReason,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<StageName>,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageStart { .. } => "stage-start",
            Self::StageComplete { .. } => "stage-complete",
            Self::CandidateGenerated { .. } => "candidate-generated",
            Self::TournamentRound { .. } => "tournament-round",
            Self::PipelineComplete { .. } => "pipeline-complete",
            Self::PipelineError { .. } => "pipeline-error",
        }
    }

    /// Whether this event ends the stream for a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PipelineComplete { .. } | Self::PipelineError { .. }
        )
    }
}

/// An event as delivered to consumers: sequence number and wall-clock stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: PipelineEvent,
}
