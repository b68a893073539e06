//! The nine pipeline stages.
//!
//! Each stage reads the immutable [`StageContext`], consumes and updates the
//! run's [`RunState`], and returns a [`StagePayload`] for the stage log. A
//! stage either succeeds or returns the `PipelineError` that ends the run;
//! the orchestrator owns sequencing, timeouts and events.

use std::sync::Arc;
use std::time::Duration;

use debate_coordination::config::{PipelineConfig, TierConfig};
use debate_coordination::events::ProgressSink;
use debate_coordination::prompts::PromptContext;
use debate_coordination::types::{
    CandidateArgument, ConsensusScores, PipelineInput, ReasoningStrategy, StageName,
};
use tokio::time::Instant;

use crate::dispatch::{CallScope, Dispatcher};
use crate::errors::PipelineError;
use crate::evidence::SearchAdapter;
use crate::providers::Embedder;

pub mod consensus;
pub mod context;
pub mod dedup;
pub mod generation;
pub mod grounding;
pub mod refinement;
pub mod strategy;
pub mod stress_test;
pub mod tournament;

/// Work that must finish on its own stops this share of the stage budget
/// before the stage timeout.
const WIND_DOWN_DIVISOR: u32 = 20;

/// Read-only inputs for one stage of a run.
pub struct StageContext<'a> {
    pub input: &'a PipelineInput,
    pub config: &'a PipelineConfig,
    pub tier: &'a TierConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub embedder: &'a dyn Embedder,
    pub search: &'a SearchAdapter,
    pub sink: &'a ProgressSink,
    /// When the orchestrator's timeout for this stage fires.
    pub deadline: Instant,
    pub budget: Duration,
}

impl<'a> StageContext<'a> {
    pub fn prompt_context(&self) -> PromptContext<'a> {
        PromptContext::new(&self.input.context, self.input.argument_type)
    }

    /// Model calls may retry until the stage deadline.
    pub fn scope(&self, stage: StageName) -> CallScope {
        CallScope::within(stage, self.deadline)
    }

    /// Just before `deadline`. Stages that degrade instead of failing stop
    /// here and keep what they have.
    pub fn wind_down_deadline(&self) -> Instant {
        self.deadline - self.budget / WIND_DOWN_DIVISOR
    }
}

/// Everything stages hand to each other during one run.
#[derive(Debug, Default)]
pub struct RunState {
    pub summary: String,
    pub strategies: Vec<ReasoningStrategy>,
    pub candidates: Vec<CandidateArgument>,
    /// Tournament winner; the only candidate after stage 4.
    pub leader: Option<CandidateArgument>,
    pub consensus: Option<ConsensusScores>,
    /// Set by refinement.
    pub refined_quality: Option<f64>,
    models_used: Vec<String>,
}

impl RunState {
    /// Record a model that served a call. Keeps first-use order.
    pub fn record_model(&mut self, model: &str) {
        if !self.models_used.iter().any(|m| m == model) {
            self.models_used.push(model.to_string());
        }
    }

    pub fn models_used(&self) -> &[String] {
        &self.models_used
    }

    pub fn leader(&self) -> Result<&CandidateArgument, PipelineError> {
        self.leader
            .as_ref()
            .ok_or(PipelineError::InsufficientCandidates { got: 0, need: 1 })
    }

    pub fn leader_mut(&mut self) -> Result<&mut CandidateArgument, PipelineError> {
        self.leader
            .as_mut()
            .ok_or(PipelineError::InsufficientCandidates { got: 0, need: 1 })
    }

    /// Refinement's score when it ran, else the mean consensus median.
    pub fn quality_score(&self) -> f64 {
        self.refined_quality
            .or_else(|| self.consensus.map(|c| c.mean()))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }
}
