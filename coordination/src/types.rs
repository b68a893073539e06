//! Domain types shared by every stage of the argument pipeline.
//!
//! The debate context is supplied by the caller and is read-only for the
//! whole run. Candidates are created during diverse generation and mutated
//! only by the tournament (ratings), the consensus panel (scores), the
//! evidence stage (sources) and the final refinement (text).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::INITIAL_RATING;

/// Minimum length (in characters) of any argument text.
pub const MIN_ARGUMENT_CHARS: usize = 10;
/// Maximum length (in characters) of any argument text.
pub const MAX_ARGUMENT_CHARS: usize = 2000;

/// Whether `text` fits the 10–2000 character argument bounds.
pub fn argument_length_ok(text: &str) -> bool {
    let len = text.chars().count();
    (MIN_ARGUMENT_CHARS..=MAX_ARGUMENT_CHARS).contains(&len)
}

/// Position of an argument relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArgumentType {
    Pro,
    Con,
    /// Root of the debate tree; only appears in the context, never generated.
    Thesis,
}

impl ArgumentType {
    /// Verb phrase used by prompts ("supporting" / "opposing").
    pub fn direction(self) -> &'static str {
        match self {
            Self::Pro => "supporting",
            Self::Con => "opposing",
            Self::Thesis => "stating",
        }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pro => write!(f, "PRO"),
            Self::Con => write!(f, "CON"),
            Self::Thesis => write!(f, "THESIS"),
        }
    }
}

/// The fixed set of reasoning strategies a candidate can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningStrategy {
    Logical,
    Empirical,
    Ethical,
    Analogical,
    Precedent,
    Consequentialist,
    Definitional,
}

impl ReasoningStrategy {
    /// Every strategy, in canonical order.
    pub const ALL: [ReasoningStrategy; 7] = [
        Self::Logical,
        Self::Empirical,
        Self::Ethical,
        Self::Analogical,
        Self::Precedent,
        Self::Consequentialist,
        Self::Definitional,
    ];

    /// Wire tag (`"logical"`, `"empirical"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logical => "logical",
            Self::Empirical => "empirical",
            Self::Ethical => "ethical",
            Self::Analogical => "analogical",
            Self::Precedent => "precedent",
            Self::Consequentialist => "consequentialist",
            Self::Definitional => "definitional",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Logical => "Logical",
            Self::Empirical => "Empirical",
            Self::Ethical => "Ethical",
            Self::Analogical => "Analogical",
            Self::Precedent => "Precedent",
            Self::Consequentialist => "Consequentialist",
            Self::Definitional => "Definitional",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Logical => "Uses formal logic, syllogisms, and deductive/inductive reasoning",
            Self::Empirical => "Relies on data, statistics, studies, and observable evidence",
            Self::Ethical => "Appeals to moral principles, rights, duties, and values",
            Self::Analogical => "Draws parallels from similar situations or domains",
            Self::Precedent => {
                "References historical examples, legal precedent, or established patterns"
            }
            Self::Consequentialist => "Evaluates arguments by their outcomes and consequences",
            Self::Definitional => {
                "Argues based on definitions, classifications, and semantic boundaries"
            }
        }
    }

    /// Parse a wire tag, case-insensitively. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == tag)
    }
}

impl fmt::Display for ReasoningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription tier. Resolved by the caller; governs stage depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Explorer,
    Thinker,
    Scholar,
    Institution,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explorer => "explorer",
            Self::Thinker => "thinker",
            Self::Scholar => "scholar",
            Self::Institution => "institution",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existing argument in the debate tree (thesis, ancestor, sibling or target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    /// User-submitted arguments may carry no strategy tag.
    #[serde(default)]
    pub reasoning_strategy: Option<ReasoningStrategy>,
    #[serde(default)]
    pub depth_level: u32,
}

/// Pre-fetched debate context. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateContext {
    pub thesis: Argument,
    #[serde(default)]
    pub ancestors: Vec<Argument>,
    #[serde(default)]
    pub siblings: Vec<Argument>,
    pub target: Argument,
    pub debate_title: String,
}

/// Everything a single pipeline run needs. Owned by the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub context: DebateContext,
    pub parent_id: String,
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    pub debate_id: String,
    pub tier: Tier,
    #[serde(default)]
    pub preferred_strategy: Option<ReasoningStrategy>,
    /// Embeddings of the existing siblings, in sibling order.
    #[serde(default)]
    pub sibling_embeddings: Option<Vec<Vec<f64>>>,
}

/// Median scores assigned by the consensus panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusScores {
    pub novelty: f64,
    pub relevance: f64,
    pub logical_strength: f64,
}

impl ConsensusScores {
    /// Arithmetic mean of the three dimensions.
    pub fn mean(&self) -> f64 {
        (self.novelty + self.relevance + self.logical_strength) / 3.0
    }
}

/// A generated argument competing to become the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateArgument {
    pub id: Uuid,
    pub text: String,
    pub strategy: ReasoningStrategy,
    /// Model that produced the text.
    pub model_source: String,
    /// Position in generation order; breaks rating ties.
    pub generation_index: usize,
    pub elo_rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_scores: Option<ConsensusScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_similarity: Option<f64>,
    #[serde(default)]
    pub evidence_sources: Vec<String>,
}

impl CandidateArgument {
    pub fn new(
        text: impl Into<String>,
        strategy: ReasoningStrategy,
        model_source: impl Into<String>,
        generation_index: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            strategy,
            model_source: model_source.into(),
            generation_index,
            elo_rating: INITIAL_RATING,
            consensus_scores: None,
            resilience_score: None,
            max_similarity: None,
            evidence_sources: Vec::new(),
        }
    }
}

/// The nine pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    ContextExtraction,
    StrategySelection,
    DiverseGeneration,
    Tournament,
    EnsembleConsensus,
    SemanticDedup,
    EvidenceGrounding,
    AdversarialStressTest,
    FinalRefinement,
}

impl StageName {
    pub const ALL: [StageName; 9] = [
        Self::ContextExtraction,
        Self::StrategySelection,
        Self::DiverseGeneration,
        Self::Tournament,
        Self::EnsembleConsensus,
        Self::SemanticDedup,
        Self::EvidenceGrounding,
        Self::AdversarialStressTest,
        Self::FinalRefinement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextExtraction => "context-extraction",
            Self::StrategySelection => "strategy-selection",
            Self::DiverseGeneration => "diverse-generation",
            Self::Tournament => "tournament",
            Self::EnsembleConsensus => "ensemble-consensus",
            Self::SemanticDedup => "semantic-dedup",
            Self::EvidenceGrounding => "evidence-grounding",
            Self::AdversarialStressTest => "adversarial-stress-test",
            Self::FinalRefinement => "final-refinement",
        }
    }

    /// 1-based stage number.
    pub fn number(self) -> u8 {
        match self {
            Self::ContextExtraction => 1,
            Self::StrategySelection => 2,
            Self::DiverseGeneration => 3,
            Self::Tournament => 4,
            Self::EnsembleConsensus => 5,
            Self::SemanticDedup => 6,
            Self::EvidenceGrounding => 7,
            Self::AdversarialStressTest => 8,
            Self::FinalRefinement => 9,
        }
    }

    /// The stage after this one, or `None` for the last stage.
    pub fn next(self) -> Option<StageName> {
        Self::ALL.get(self.number() as usize).copied()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    /// Not enabled for the run's tier.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Stage-specific summary attached to a [`StageResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    Context {
        summary_chars: usize,
        sibling_count: usize,
    },
    Strategies {
        strategies: Vec<ReasoningStrategy>,
    },
    Generation {
        candidates: usize,
        failures: usize,
        models: Vec<String>,
    },
    Tournament {
        matches: usize,
        votes: usize,
        leader: Uuid,
        advanced: Vec<Uuid>,
    },
    Consensus {
        responded: usize,
        abstained: usize,
        passing_votes: usize,
        passed: bool,
    },
    Dedup {
        siblings_compared: usize,
        max_similarity: f64,
    },
    Evidence {
        searches: usize,
        sources: usize,
        /// The search backend or model failed, or the stage ran out of time.
        degraded: bool,
    },
    StressTest {
        resilience_score: f64,
        attacks: usize,
    },
    Refinement {
        quality_score: f64,
        original_chars: usize,
        refined_chars: usize,
    },
}

/// One entry in the append-only stage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StagePayload>,
}

/// The terminal success value of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub argument_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    pub parent_id: String,
    pub debate_id: String,
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience_score: Option<f64>,
    pub reasoning_strategy: ReasoningStrategy,
    pub generated_by: String,
    pub evidence_sources: Vec<String>,
    pub depth_level: u32,
    pub tier: Tier,
    pub models_used: Vec<String>,
    pub total_duration_ms: u64,
    pub stages: Vec<StageResult>,
}

/// How a rejected run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Rejected,
    TimedOut,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "REJECTED"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Reason code carried by a [`RejectedArgument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    PoolExhausted,
    StageTimeout,
    RunTimeout,
    QuorumNotReached,
    DuplicateOfSibling,
    MalformedModelOutput,
    InvalidContext,
    InsufficientCandidates,
    NoTournamentVotes,
    QualityGate,
    FailedStressTest,
    ModelUnavailable,
    EmbeddingFailed,
    Cancelled,
}

impl RejectionReason {
    /// Human-readable reason phrase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PoolExhausted => "pool exhausted",
            Self::StageTimeout => "stage timed out",
            Self::RunTimeout => "run timed out",
            Self::QuorumNotReached => "quorum not reached",
            Self::DuplicateOfSibling => "duplicate of sibling",
            Self::MalformedModelOutput => "malformed model output",
            Self::InvalidContext => "invalid context",
            Self::InsufficientCandidates => "insufficient candidates",
            Self::NoTournamentVotes => "no tournament votes",
            Self::QualityGate => "below consensus quality gate",
            Self::FailedStressTest => "failed stress test",
            Self::ModelUnavailable => "model unavailable",
            Self::EmbeddingFailed => "embedding failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted instead of a [`PipelineResult`] when no candidate survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedArgument {
    pub status: RunStatus,
    pub reason: RejectionReason,
    pub message: String,
    /// Stage that ended the run, if any stage had started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    pub total_duration_ms: u64,
    pub stages: Vec<StageResult>,
}

/// Exactly one of these is produced per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed(PipelineResult),
    Rejected(RejectedArgument),
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            Self::Completed(r) => Some(r),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectedArgument> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }

    pub fn stages(&self) -> &[StageResult] {
        match self {
            Self::Completed(r) => &r.stages,
            Self::Rejected(r) => &r.stages,
        }
    }
}
