//! Run orchestration: the nine stages in order, under per-stage timeouts and
//! one run ceiling.
//!
//! ## Lifecycle
//!
//! ```text
//! Orchestrator::run(input, sink)
//!   → for each stage:
//!       stage-start event
//!       skipped (tier) | select { cancel, ceiling, timeout(stage) }
//!       stage log entry + stage-complete event
//!   → pipeline-complete | pipeline-error
//! ```
//!
//! The stage log and state machine live outside the per-stage future, so a
//! ceiling or cancellation drops in-flight model calls but keeps the log of
//! everything that already finished.
//!
//! Each stage sees its own deadline through [`StageContext`]. Model retries
//! share what is left of it, and advisory work winds down just before it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use debate_coordination::config::PipelineConfig;
use debate_coordination::events::{PipelineEvent, ProgressSink};
use debate_coordination::registry::ModelRegistry;
use debate_coordination::types::{
    PipelineInput, PipelineOutcome, PipelineResult, RejectedArgument, RunStatus, StageName,
    StagePayload, StageResult, StageStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::dispatch::Dispatcher;
use crate::errors::PipelineError;
use crate::evidence::SearchAdapter;
use crate::providers::{
    BraveSearch, Embedder, ModelClient, OpenAiCompatClient, OpenAiCompatEmbedder, WebSearch,
};
use crate::stages::{self, RunState, StageContext};
use crate::state_machine::{PipelineState, StateMachine};

/// The external services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn ModelClient>,
    pub embedder: Arc<dyn Embedder>,
    pub search: Arc<dyn WebSearch>,
}

impl Collaborators {
    /// HTTP collaborators for the configured endpoints.
    pub fn from_endpoints(endpoints: &EndpointConfig) -> Result<Self> {
        let client = OpenAiCompatClient::from_config(endpoints)
            .context("Failed to build model client")?;
        let embedder = OpenAiCompatEmbedder::from_config(endpoints)
            .context("Failed to build embedding client")?;
        let search = BraveSearch::from_config(endpoints).context("Failed to build search client")?;
        if !search.is_configured() {
            warn!("BRAVE_SEARCH_API_KEY not set, evidence grounding will find no sources");
        }
        Ok(Self {
            client: Arc::new(client),
            embedder: Arc::new(embedder),
            search: Arc::new(search),
        })
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    dispatcher: Arc<Dispatcher>,
    embedder: Arc<dyn Embedder>,
    search: SearchAdapter,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ModelRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_config(
            &config,
            registry,
            collaborators.client,
        ));
        let search = SearchAdapter::new(collaborators.search, config.limits.results_per_search);
        Self {
            config,
            dispatcher,
            embedder: collaborators.embedder,
            search,
        }
    }

    /// Builds the registry from `config.model_pool`.
    pub fn from_config(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let registry = Arc::new(
            ModelRegistry::new(config.model_pool.iter().cloned())
                .with_unhealthy_cooldown(config.unhealthy_cooldown()),
        );
        Self::new(config, registry, collaborators)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.dispatcher.registry()
    }

    pub async fn run(&self, input: PipelineInput, sink: &ProgressSink) -> PipelineOutcome {
        self.run_with_cancel(input, sink, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but ends with `cancelled` as soon as `cancel`
    /// fires. In-flight calls are dropped.
    pub async fn run_with_cancel(
        &self,
        input: PipelineInput,
        sink: &ProgressSink,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let ceiling = self.config.timeouts.run_ceiling();
        let deadline = started + ceiling;
        let tier = self.config.tiers.get(input.tier);
        let mut state = RunState::default();
        let mut machine = StateMachine::new();
        let mut log: Vec<StageResult> = Vec::with_capacity(StageName::ALL.len());

        info!(
            debate = %input.debate_id,
            parent = %input.parent_id,
            argument_type = %input.argument_type,
            tier = %input.tier,
            "Pipeline run starting"
        );

        for stage in StageName::ALL {
            transition(&mut machine, PipelineState::Stage(stage), None);
            sink.emit(PipelineEvent::StageStart {
                stage,
                number: stage.number(),
            });

            if !tier.is_enabled(stage) {
                debug!(stage = %stage, tier = %input.tier, "Stage disabled for tier");
                record(&mut log, sink, stage, StageStatus::Skipped, 0, None, None);
                continue;
            }

            let stage_started = Instant::now();
            let stage_timeout = self.config.timeouts.for_stage(stage);
            let ctx = StageContext {
                input: &input,
                config: &self.config,
                tier,
                dispatcher: self.dispatcher.clone(),
                embedder: self.embedder.as_ref(),
                search: &self.search,
                sink,
                deadline: stage_started + stage_timeout,
                budget: stage_timeout,
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(PipelineError::Cancelled("run cancelled by caller".into()))
                }
                _ = tokio::time::sleep_until(deadline) => {
                    Err(PipelineError::RunTimeout { ceiling_ms: millis(ceiling) })
                }
                result = tokio::time::timeout_at(ctx.deadline, run_stage(stage, &ctx, &mut state)) => {
                    result.unwrap_or(Err(PipelineError::StageTimeout {
                        stage,
                        timeout_ms: millis(stage_timeout),
                    }))
                }
            };
            let elapsed_ms = millis(stage_started.elapsed());

            match outcome {
                Ok(payload) => {
                    info!(stage = %stage, elapsed_ms, "Stage succeeded");
                    record(
                        &mut log,
                        sink,
                        stage,
                        StageStatus::Succeeded,
                        elapsed_ms,
                        None,
                        Some(payload),
                    );
                }
                Err(err) => {
                    let status = match err {
                        PipelineError::StageTimeout { .. } | PipelineError::RunTimeout { .. } => {
                            StageStatus::TimedOut
                        }
                        _ => StageStatus::Failed,
                    };
                    warn!(stage = %stage, status = %status, elapsed_ms, error = %err, "Stage ended the run");
                    record(
                        &mut log,
                        sink,
                        stage,
                        status,
                        elapsed_ms,
                        Some(err.to_string()),
                        None,
                    );
                    return reject(err, Some(stage), &mut machine, log, started, sink);
                }
            }
        }

        match build_result(&input, &state, started) {
            Ok(mut result) => {
                transition(&mut machine, PipelineState::Done, None);
                result.stages = log;
                info!(
                    argument = %result.argument_id,
                    quality = result.quality_score,
                    model = %result.generated_by,
                    total_duration_ms = result.total_duration_ms,
                    transitions = %machine.summary(),
                    "Pipeline run completed"
                );
                sink.emit(PipelineEvent::PipelineComplete {
                    argument_id: result.argument_id,
                    quality_score: result.quality_score,
                    total_duration_ms: result.total_duration_ms,
                });
                PipelineOutcome::Completed(result)
            }
            Err(err) => reject(err, None, &mut machine, log, started, sink),
        }
    }
}

/// The produced interface: one run, one outcome.
pub async fn run_pipeline(
    orchestrator: &Orchestrator,
    input: PipelineInput,
    sink: &ProgressSink,
) -> PipelineOutcome {
    orchestrator.run(input, sink).await
}

async fn run_stage(
    stage: StageName,
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    match stage {
        StageName::ContextExtraction => stages::context::run(ctx, state),
        StageName::StrategySelection => stages::strategy::run(ctx, state).await,
        StageName::DiverseGeneration => stages::generation::run(ctx, state).await,
        StageName::Tournament => stages::tournament::run(ctx, state).await,
        StageName::EnsembleConsensus => stages::consensus::run(ctx, state).await,
        StageName::SemanticDedup => stages::dedup::run(ctx, state).await,
        StageName::EvidenceGrounding => stages::grounding::run(ctx, state).await,
        StageName::AdversarialStressTest => stages::stress_test::run(ctx, state).await,
        StageName::FinalRefinement => stages::refinement::run(ctx, state).await,
    }
}

fn build_result(
    input: &PipelineInput,
    state: &RunState,
    started: Instant,
) -> Result<PipelineResult, PipelineError> {
    let leader = state.leader()?;
    Ok(PipelineResult {
        argument_id: leader.id,
        text: leader.text.clone(),
        argument_type: input.argument_type,
        parent_id: input.parent_id.clone(),
        debate_id: input.debate_id.clone(),
        quality_score: state.quality_score(),
        resilience_score: leader.resilience_score,
        reasoning_strategy: leader.strategy,
        generated_by: leader.model_source.clone(),
        evidence_sources: leader.evidence_sources.clone(),
        depth_level: input.context.target.depth_level + 1,
        tier: input.tier,
        models_used: state.models_used().to_vec(),
        total_duration_ms: millis(started.elapsed()),
        stages: Vec::new(),
    })
}

fn reject(
    err: PipelineError,
    stage: Option<StageName>,
    machine: &mut StateMachine,
    stages: Vec<StageResult>,
    started: Instant,
    sink: &ProgressSink,
) -> PipelineOutcome {
    let status = err.run_status();
    let reason = err.reason();
    let message = err.to_string();
    if let Err(e) = machine.terminate(status, reason.as_str()) {
        warn!(error = %e, "Could not record terminal state");
    }
    let total_duration_ms = millis(started.elapsed());

    match status {
        RunStatus::Rejected => info!(
            reason = %reason,
            stage = ?stage,
            message = %message,
            total_duration_ms,
            "Candidate rejected"
        ),
        RunStatus::TimedOut | RunStatus::Failed => warn!(
            status = %status,
            reason = %reason,
            stage = ?stage,
            message = %message,
            total_duration_ms,
            transitions = %machine.summary(),
            "Pipeline run failed"
        ),
    }

    sink.emit(PipelineEvent::PipelineError {
        status,
        reason,
        message: message.clone(),
        stage,
    });
    PipelineOutcome::Rejected(RejectedArgument {
        status,
        reason,
        message,
        stage,
        total_duration_ms,
        stages,
    })
}

fn record(
    log: &mut Vec<StageResult>,
    sink: &ProgressSink,
    stage: StageName,
    status: StageStatus,
    elapsed_ms: u64,
    error: Option<String>,
    payload: Option<StagePayload>,
) {
    sink.emit(PipelineEvent::StageComplete {
        stage,
        status,
        elapsed_ms,
        error: error.clone(),
    });
    log.push(StageResult {
        stage,
        status,
        duration_ms: elapsed_ms,
        error,
        payload,
    });
}

fn transition(machine: &mut StateMachine, to: PipelineState, reason: Option<&str>) {
    if let Err(e) = machine.advance(to, reason) {
        warn!(error = %e, "Unexpected pipeline transition");
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
