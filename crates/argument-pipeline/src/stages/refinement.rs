//! Stage 9: final polish of the leader's text.
//!
//! The refiner may not lengthen the argument; an answer that does is treated
//! as malformed and retried like any other unparseable output.

use debate_coordination::prompts::refinement_prompt;
use debate_coordination::types::{StageName, StagePayload};
use tracing::info;

use super::{RunState, StageContext};
use crate::errors::PipelineError;
use crate::parse::parse_refinement;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let leader = state.leader()?;
    let original = leader.text.clone();
    let prompt = refinement_prompt(
        &ctx.prompt_context(),
        &original,
        &leader.evidence_sources,
        leader.resilience_score,
    );

    let dispatched = ctx
        .dispatcher
        .call_role(
            ctx.tier.roles.refiner.as_deref(),
            ctx.scope(StageName::FinalRefinement),
            &prompt,
            |raw| parse_refinement(raw, &original),
        )
        .await?;
    state.record_model(&dispatched.model);

    let refinement = dispatched.value;
    let original_chars = original.chars().count();
    let refined_chars = refinement.refined_text.chars().count();
    info!(
        original_chars,
        refined_chars,
        quality = refinement.quality_score,
        changes = %refinement.changes,
        "Leader refined"
    );

    state.leader_mut()?.text = refinement.refined_text;
    state.refined_quality = Some(refinement.quality_score);

    Ok(StagePayload::Refinement {
        quality_score: refinement.quality_score,
        original_chars,
        refined_chars,
    })
}
