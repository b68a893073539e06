//! Ensemble decisions over a candidate argument
//!
//! - **voting**: judge-panel tally with abstentions, quorum and median scores
//! - **dedup**: cosine similarity against sibling embeddings
//!
//! Both are pure functions; the runtime crate feeds them model outputs.

pub mod dedup;
pub mod voting;

pub use dedup::{cosine_similarity, find_duplicate, is_duplicate, DedupError, DedupReport, DuplicateMatch};
pub use voting::{
    median, tally, ConsensusPolicy, ConsensusVerdict, JudgeBallot, JudgeVote, QuorumNotReached,
};
