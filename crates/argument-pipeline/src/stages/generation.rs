//! Stage 3: diverse generation, one candidate per strategy.
//!
//! Each strategy gets its own dispatch, so rotation hands each one a
//! different model. Individual failures are tolerated as long as enough
//! candidates survive. Candidates keep strategy order, which is also their
//! tie-break order in the tournament.

use debate_coordination::events::PipelineEvent;
use debate_coordination::prompts::generation_prompt;
use debate_coordination::types::{CandidateArgument, ReasoningStrategy, StageName, StagePayload};
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{RunState, StageContext};
use crate::dispatch::Dispatched;
use crate::errors::PipelineError;
use crate::parse::parse_generated_argument;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let context = &ctx.input.context;
    let sibling_texts: Vec<&str> = context.siblings.iter().map(|s| s.text.as_str()).collect();

    let mut join_set: JoinSet<(usize, ReasoningStrategy, Result<Dispatched<String>, PipelineError>)> =
        JoinSet::new();
    for (index, strategy) in state.strategies.iter().copied().enumerate() {
        let prompt = generation_prompt(
            &state.summary,
            &context.target.text,
            ctx.input.argument_type,
            strategy,
            &sibling_texts,
        );
        let dispatcher = ctx.dispatcher.clone();
        let scope = ctx.scope(StageName::DiverseGeneration);
        join_set.spawn(async move {
            let result = dispatcher
                .call(scope, &prompt, |raw| {
                    parse_generated_argument(raw, strategy)
                })
                .await;
            (index, strategy, result)
        });
    }

    let mut slots: Vec<Option<CandidateArgument>> = vec![None; state.strategies.len()];
    let mut failures = 0usize;
    let mut pool_exhausted = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, strategy, Ok(dispatched))) => {
                let candidate =
                    CandidateArgument::new(dispatched.value, strategy, dispatched.model, index);
                ctx.sink.emit(PipelineEvent::CandidateGenerated {
                    candidate_id: candidate.id,
                    model: candidate.model_source.clone(),
                    strategy,
                });
                slots[index] = Some(candidate);
            }
            Ok((_, strategy, Err(e))) => {
                warn!(strategy = %strategy.as_str(), error = %e, "Candidate generation failed");
                failures += 1;
                if matches!(e, PipelineError::PoolExhausted { .. }) {
                    pool_exhausted = Some(e);
                }
            }
            Err(e) => {
                warn!(error = %e, "Generation worker panicked");
                failures += 1;
            }
        }
    }

    state.candidates = slots.into_iter().flatten().collect();
    for (generation_index, candidate) in state.candidates.iter_mut().enumerate() {
        candidate.generation_index = generation_index;
    }
    let models: Vec<String> = state
        .candidates
        .iter()
        .map(|c| c.model_source.clone())
        .collect();
    for model in &models {
        state.record_model(model);
    }

    let need = ctx.config.limits.min_candidates;
    if state.candidates.len() < need {
        // No healthy model at all is the more useful diagnosis.
        if let Some(e) = pool_exhausted {
            return Err(e);
        }
        return Err(PipelineError::InsufficientCandidates {
            got: state.candidates.len(),
            need,
        });
    }

    info!(
        candidates = state.candidates.len(),
        failures, "Diverse generation finished"
    );
    Ok(StagePayload::Generation {
        candidates: state.candidates.len(),
        failures,
        models,
    })
}
