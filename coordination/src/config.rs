//! Pipeline configuration: thresholds, timeouts, model table and tier table.
//!
//! Every field has a default, so a TOML file only needs the keys it wants
//! to change. [`PipelineConfig::validate`] rejects combinations that would
//! make a run impossible (empty pool, quorum larger than the panel, ...).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{StageName, Tier};

/// The local model pool, in rotation order.
pub const DEFAULT_MODEL_POOL: [&str; 7] = [
    "qwen2.5:latest",
    "mistral-nemo:latest",
    "glm4-9b-chat:latest",
    "gpt-oss:latest",
    "gemma2:latest",
    "deepseek-r1:8b-distill-q4_K_M",
    "nemotron-nano:latest",
];

pub const SONNET: &str = "claude-sonnet-4-5-20250929";
pub const HAIKU: &str = "claude-haiku-3.5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Decision thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Passing votes needed for consensus (and the quorum floor).
    pub consensus_min_votes: usize,
    /// Judges asked to score the leader.
    pub consensus_judges: usize,
    /// Cosine similarity at or above which a candidate duplicates a sibling.
    pub dedup_similarity: f64,
    /// Every dimension must be strictly above this for a passing vote.
    pub min_quality_score: f64,
    pub elo_initial: f64,
    pub elo_k_factor: f64,
    /// Resilience strictly below this rejects the candidate.
    pub resilience_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            consensus_min_votes: 3,
            consensus_judges: 5,
            dedup_similarity: 0.85,
            min_quality_score: 0.6,
            elo_initial: 1000.0,
            elo_k_factor: 32.0,
            resilience_threshold: 0.3,
        }
    }
}

/// Per-stage timeouts and the whole-run ceiling, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub context_extraction_ms: u64,
    pub strategy_selection_ms: u64,
    pub diverse_generation_ms: u64,
    pub tournament_ms: u64,
    pub ensemble_consensus_ms: u64,
    pub semantic_dedup_ms: u64,
    pub evidence_grounding_ms: u64,
    pub adversarial_stress_test_ms: u64,
    pub final_refinement_ms: u64,
    pub run_ceiling_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            context_extraction_ms: 30_000,
            strategy_selection_ms: 30_000,
            diverse_generation_ms: 120_000,
            tournament_ms: 90_000,
            ensemble_consensus_ms: 60_000,
            semantic_dedup_ms: 30_000,
            evidence_grounding_ms: 60_000,
            adversarial_stress_test_ms: 90_000,
            final_refinement_ms: 60_000,
            run_ceiling_ms: 600_000,
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: StageName) -> Duration {
        let ms = match stage {
            StageName::ContextExtraction => self.context_extraction_ms,
            StageName::StrategySelection => self.strategy_selection_ms,
            StageName::DiverseGeneration => self.diverse_generation_ms,
            StageName::Tournament => self.tournament_ms,
            StageName::EnsembleConsensus => self.ensemble_consensus_ms,
            StageName::SemanticDedup => self.semantic_dedup_ms,
            StageName::EvidenceGrounding => self.evidence_grounding_ms,
            StageName::AdversarialStressTest => self.adversarial_stress_test_ms,
            StageName::FinalRefinement => self.final_refinement_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn run_ceiling(&self) -> Duration {
        Duration::from_millis(self.run_ceiling_ms)
    }
}

/// Timeout and token budget for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

impl ModelConfig {
    pub const fn new(timeout_ms: u64, max_tokens: u32) -> Self {
        Self {
            timeout_ms,
            max_tokens,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(60_000, 1000)
    }
}

/// Default model settings plus named overrides. Lookups are exact-match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfigTable {
    pub default: ModelConfig,
    pub overrides: BTreeMap<String, ModelConfig>,
}

impl Default for ModelConfigTable {
    fn default() -> Self {
        let overrides = [
            ("deepseek-r1:8b-distill-q4_K_M", ModelConfig::new(90_000, 800)),
            ("nemotron-nano:latest", ModelConfig::new(45_000, 1000)),
            (SONNET, ModelConfig::new(60_000, 4096)),
            (HAIKU, ModelConfig::new(30_000, 4096)),
            ("gpt-4o", ModelConfig::new(60_000, 4096)),
        ]
        .into_iter()
        .map(|(name, cfg)| (name.to_string(), cfg))
        .collect();

        Self {
            default: ModelConfig::default(),
            overrides,
        }
    }
}

impl ModelConfigTable {
    pub fn get(&self, model: &str) -> ModelConfig {
        self.overrides.get(model).copied().unwrap_or(self.default)
    }
}

/// Bounded retries for a single model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after a timeout or transport failure.
    pub max_transient_retries: u32,
    /// Extra attempts after unparseable output.
    pub max_malformed_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: 2,
            max_malformed_retries: 1,
        }
    }
}

/// Sizes and fan-out bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineLimits {
    /// Concurrent in-flight model calls per run.
    pub max_concurrent_calls: usize,
    pub target_candidates: usize,
    pub min_candidates: usize,
    /// Top-rated candidates recorded as advancing out of the tournament.
    pub advance_count: usize,
    pub votes_per_pair: usize,
    pub max_search_iterations: usize,
    pub results_per_search: usize,
    pub max_evidence_sources: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 2,
            target_candidates: 5,
            min_candidates: 2,
            advance_count: 3,
            votes_per_pair: 3,
            max_search_iterations: 3,
            results_per_search: 3,
            max_evidence_sources: 3,
        }
    }
}

/// Named models pinned to evaluation roles for a tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleModels {
    pub evaluator: Option<String>,
    pub stress_tester: Option<String>,
    pub refiner: Option<String>,
}

/// Stage gating and role models for one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// 1-based stage numbers that run for this tier.
    pub enabled_stages: Vec<u8>,
    #[serde(default)]
    pub roles: RoleModels,
}

impl TierConfig {
    pub fn is_enabled(&self, stage: StageName) -> bool {
        self.enabled_stages.contains(&stage.number())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub explorer: TierConfig,
    pub thinker: TierConfig,
    pub scholar: TierConfig,
    pub institution: TierConfig,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            explorer: TierConfig {
                enabled_stages: (1..=6).collect(),
                roles: RoleModels::default(),
            },
            thinker: TierConfig {
                enabled_stages: (1..=7).collect(),
                roles: RoleModels {
                    evaluator: Some(HAIKU.to_string()),
                    ..RoleModels::default()
                },
            },
            scholar: TierConfig {
                enabled_stages: (1..=9).collect(),
                roles: RoleModels {
                    evaluator: Some(SONNET.to_string()),
                    stress_tester: Some(SONNET.to_string()),
                    refiner: Some(HAIKU.to_string()),
                },
            },
            institution: TierConfig {
                enabled_stages: (1..=9).collect(),
                roles: RoleModels {
                    evaluator: Some(SONNET.to_string()),
                    stress_tester: Some(SONNET.to_string()),
                    refiner: Some(SONNET.to_string()),
                },
            },
        }
    }
}

impl TierTable {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Explorer => &self.explorer,
            Tier::Thinker => &self.thinker,
            Tier::Scholar => &self.scholar,
            Tier::Institution => &self.institution,
        }
    }

    /// A table where every tier runs all nine stages with rotated models.
    pub fn all_stages_local() -> Self {
        let full = TierConfig {
            enabled_stages: (1..=9).collect(),
            roles: RoleModels::default(),
        };
        Self {
            explorer: full.clone(),
            thinker: full.clone(),
            scholar: full.clone(),
            institution: full,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model_pool: Vec<String>,
    pub thresholds: Thresholds,
    pub timeouts: StageTimeouts,
    pub models: ModelConfigTable,
    pub retry: RetryPolicy,
    pub limits: PipelineLimits,
    pub tiers: TierTable,
    /// Seconds before an unhealthy model is offered again. `None` never recovers.
    pub unhealthy_cooldown_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_pool: DEFAULT_MODEL_POOL.iter().map(|m| m.to_string()).collect(),
            thresholds: Thresholds::default(),
            timeouts: StageTimeouts::default(),
            models: ModelConfigTable::default(),
            retry: RetryPolicy::default(),
            limits: PipelineLimits::default(),
            tiers: TierTable::default(),
            unhealthy_cooldown_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn unhealthy_cooldown(&self) -> Option<Duration> {
        self.unhealthy_cooldown_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let t = &self.thresholds;
        let l = &self.limits;

        if self.model_pool.is_empty() {
            return invalid("model_pool must not be empty".into());
        }
        if t.consensus_min_votes == 0 || t.consensus_min_votes > t.consensus_judges {
            return invalid(format!(
                "consensus_min_votes ({}) must be between 1 and consensus_judges ({})",
                t.consensus_min_votes, t.consensus_judges
            ));
        }
        for (name, v) in [
            ("dedup_similarity", t.dedup_similarity),
            ("min_quality_score", t.min_quality_score),
            ("resilience_threshold", t.resilience_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return invalid(format!("{name} must be within [0, 1], got {v}"));
            }
        }
        if t.elo_k_factor <= 0.0 {
            return invalid("elo_k_factor must be positive".into());
        }
        if l.max_concurrent_calls == 0 {
            return invalid("max_concurrent_calls must be at least 1".into());
        }
        if l.min_candidates < 2 || l.min_candidates > l.target_candidates {
            return invalid(format!(
                "min_candidates ({}) must be between 2 and target_candidates ({})",
                l.min_candidates, l.target_candidates
            ));
        }
        if l.votes_per_pair == 0 {
            return invalid("votes_per_pair must be at least 1".into());
        }
        for tier in [Tier::Explorer, Tier::Thinker, Tier::Scholar, Tier::Institution] {
            let stages = &self.tiers.get(tier).enabled_stages;
            // the core stages always run; only the tail is optional
            if !(1..=6).all(|n| stages.contains(&n)) {
                return invalid(format!("tier {tier} must enable stages 1-6"));
            }
            if stages.iter().any(|n| *n == 0 || *n > 9) {
                return invalid(format!("tier {tier} names an unknown stage"));
            }
        }
        if self.timeouts.run_ceiling_ms == 0 {
            return invalid("run_ceiling_ms must be positive".into());
        }
        Ok(())
    }
}
