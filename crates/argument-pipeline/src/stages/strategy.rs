//! Stage 2: strategy selection.
//!
//! With siblings present the least-used strategies go first. Without
//! siblings a model picks the order; if it fails or names too few valid
//! strategies the fixed order is used. A preferred strategy always leads.

use debate_coordination::prompts::strategy_selection_prompt;
use debate_coordination::types::{Argument, ReasoningStrategy, StageName, StagePayload};
use tracing::{info, warn};

use super::{RunState, StageContext};
use crate::errors::PipelineError;
use crate::parse::parse_strategy_selection;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let count = ctx.config.limits.target_candidates.min(ReasoningStrategy::ALL.len());
    let siblings = &ctx.input.context.siblings;

    let ordered = if !siblings.is_empty() {
        least_used_first(siblings)
    } else {
        let prompt = strategy_selection_prompt(
            &ctx.prompt_context(),
            &ReasoningStrategy::ALL,
            count,
        );
        match ctx
            .dispatcher
            .call(ctx.scope(StageName::StrategySelection), &prompt, |raw| {
                parse_strategy_selection(raw, count)
            })
            .await
        {
            Ok(dispatched) => {
                state.record_model(&dispatched.model);
                dispatched.value
            }
            Err(e @ PipelineError::PoolExhausted { .. }) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Strategy selection model failed, using default order");
                ReasoningStrategy::ALL.to_vec()
            }
        }
    };

    state.strategies = with_preferred(ordered, ctx.input.preferred_strategy, count);
    info!(
        strategies = ?state.strategies.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "Strategies selected"
    );
    Ok(StagePayload::Strategies {
        strategies: state.strategies.clone(),
    })
}

/// All strategies ordered by sibling usage, ascending. Stable on ties.
pub fn least_used_first(siblings: &[Argument]) -> Vec<ReasoningStrategy> {
    let usage = |s: &ReasoningStrategy| {
        siblings
            .iter()
            .filter(|a| a.reasoning_strategy == Some(*s))
            .count()
    };
    let mut ordered = ReasoningStrategy::ALL.to_vec();
    ordered.sort_by_key(usage);
    ordered
}

/// Put `preferred` first, drop its later occurrence, keep `count`.
pub fn with_preferred(
    ordered: Vec<ReasoningStrategy>,
    preferred: Option<ReasoningStrategy>,
    count: usize,
) -> Vec<ReasoningStrategy> {
    let mut picked: Vec<ReasoningStrategy> = preferred.into_iter().collect();
    picked.extend(ordered.into_iter().filter(|s| Some(*s) != preferred));
    picked.truncate(count);
    picked
}
