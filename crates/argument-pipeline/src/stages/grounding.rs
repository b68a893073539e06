//! Stage 7: evidence grounding. Advisory only; never fails the run, and
//! winds down before the stage timeout with whatever it found.

use debate_coordination::types::StagePayload;

use super::{RunState, StageContext};
use crate::errors::PipelineError;
use crate::evidence::EvidenceLoop;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let limits = &ctx.config.limits;
    let evidence = EvidenceLoop::new(
        &ctx.dispatcher,
        ctx.search,
        ctx.tier.roles.evaluator.as_deref(),
        limits.max_search_iterations,
        limits.max_evidence_sources,
    )
    .with_deadline(ctx.wind_down_deadline());
    let outcome = evidence
        .run(&ctx.prompt_context(), &state.leader()?.text)
        .await;

    for model in &outcome.models {
        state.record_model(model);
    }
    let sources = outcome.sources.len();
    state.leader_mut()?.evidence_sources = outcome.sources;

    Ok(StagePayload::Evidence {
        searches: outcome.searches,
        sources,
        degraded: outcome.degraded,
    })
}
