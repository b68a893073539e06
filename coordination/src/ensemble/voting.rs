//! Consensus tally for the judge panel
//!
//! Each judge scores one candidate on three dimensions. A vote passes when
//! every dimension is strictly above the quality floor; the candidate passes
//! when enough votes pass. Judges that fail or time out abstain and count
//! for neither side, but too few responders means no verdict at all.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Thresholds;
use crate::types::ConsensusScores;

/// One judge's scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeVote {
    pub novelty: f64,
    pub relevance: f64,
    pub logical_strength: f64,
}

impl JudgeVote {
    pub fn new(novelty: f64, relevance: f64, logical_strength: f64) -> Self {
        Self {
            novelty,
            relevance,
            logical_strength,
        }
    }

    /// Whether all three dimensions are strictly above `floor`.
    pub fn passes(&self, floor: f64) -> bool {
        self.novelty > floor && self.relevance > floor && self.logical_strength > floor
    }

    pub fn in_range(&self) -> bool {
        [self.novelty, self.relevance, self.logical_strength]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// A judge either votes or abstains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JudgeBallot {
    Vote(JudgeVote),
    Abstain,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPolicy {
    /// Passing votes needed; also the minimum number of responders.
    pub min_votes: usize,
    pub min_quality_score: f64,
}

impl ConsensusPolicy {
    pub fn from_thresholds(t: &Thresholds) -> Self {
        Self {
            min_votes: t.consensus_min_votes,
            min_quality_score: t.min_quality_score,
        }
    }
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self::from_thresholds(&Thresholds::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub passed: bool,
    pub responded: usize,
    pub abstained: usize,
    pub passing_votes: usize,
    /// Per-dimension medians over responders.
    pub medians: ConsensusScores,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("quorum not reached: {responded} judges responded, {required} required")]
pub struct QuorumNotReached {
    pub responded: usize,
    pub required: usize,
}

/// Median of `values`; mean of the middle pair for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Tally a panel's ballots.
pub fn tally(
    ballots: &[JudgeBallot],
    policy: &ConsensusPolicy,
) -> Result<ConsensusVerdict, QuorumNotReached> {
    let votes: Vec<&JudgeVote> = ballots
        .iter()
        .filter_map(|b| match b {
            JudgeBallot::Vote(v) => Some(v),
            JudgeBallot::Abstain => None,
        })
        .collect();
    let responded = votes.len();
    let abstained = ballots.len() - responded;

    if responded < policy.min_votes {
        return Err(QuorumNotReached {
            responded,
            required: policy.min_votes,
        });
    }

    let passing_votes = votes
        .iter()
        .filter(|v| v.passes(policy.min_quality_score))
        .count();

    let dim = |f: fn(&JudgeVote) -> f64| {
        let values: Vec<f64> = votes.iter().map(|v| f(v)).collect();
        median(&values).unwrap_or(0.0)
    };
    let medians = ConsensusScores {
        novelty: dim(|v| v.novelty),
        relevance: dim(|v| v.relevance),
        logical_strength: dim(|v| v.logical_strength),
    };

    let passed = passing_votes >= policy.min_votes;
    debug!(responded, abstained, passing_votes, passed, "Consensus tallied");

    Ok(ConsensusVerdict {
        passed,
        responded,
        abstained,
        passing_votes,
        medians,
    })
}
