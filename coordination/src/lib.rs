//! Debate Coordination Library
//!
//! Deterministic decision engines behind the argument pipeline. Nothing in
//! this crate performs network I/O; the runtime crate feeds it model output.
//!
//! - `types`: debate context, candidates, stage log and run outcomes
//! - `config`: thresholds, timeouts, model table and tier table (TOML)
//! - `registry`: round-robin model rotation with health tracking
//! - `limiter`: FIFO counting semaphore for concurrent model calls
//! - `scoring`: Elo ratings, pair schedules and tournament standings
//! - `ensemble`: judge-panel consensus tally and semantic dedup
//! - `prompts`: prompt builders for every model-facing stage
//! - `events`: progress event vocabulary and the non-blocking sink
//! - `resilience`: degraded responses for optional collaborators

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod ensemble;
pub mod events;
pub mod limiter;
pub mod prompts;
pub mod registry;
pub mod resilience;
pub mod scoring;
pub mod types;

pub use config::{ConfigError, ModelConfig, ModelConfigTable, PipelineConfig, TierConfig};
pub use ensemble::{
    cosine_similarity, find_duplicate, tally, ConsensusPolicy, ConsensusVerdict, DedupError,
    JudgeBallot, JudgeVote, QuorumNotReached,
};
pub use events::{EventEnvelope, PipelineEvent, ProgressReceiver, ProgressSink};
pub use limiter::{CallLimiter, CallPermit};
pub use registry::{ModelEntry, ModelHealth, ModelRegistry, RegistryError};
pub use resilience::{DegradationLevel, DegradedResponse};
pub use scoring::{expected_score, generate_pairs, update_elo, EloUpdate, Side, Tournament};
pub use types::{
    Argument, ArgumentType, CandidateArgument, ConsensusScores, DebateContext, PipelineInput,
    PipelineOutcome, PipelineResult, ReasoningStrategy, RejectedArgument, RejectionReason,
    RunStatus, StageName, StagePayload, StageResult, StageStatus, Tier,
};
