//! Stage 8: adversarial stress test of the leader.

use debate_coordination::prompts::stress_test_prompt;
use debate_coordination::types::{StageName, StagePayload};
use tracing::info;

use super::{RunState, StageContext};
use crate::errors::PipelineError;
use crate::parse::parse_stress_test;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let leader = state.leader()?;
    let prompt = stress_test_prompt(&ctx.prompt_context(), &leader.text, &leader.evidence_sources);

    let dispatched = ctx
        .dispatcher
        .call_role(
            ctx.tier.roles.stress_tester.as_deref(),
            ctx.scope(StageName::AdversarialStressTest),
            &prompt,
            parse_stress_test,
        )
        .await?;
    state.record_model(&dispatched.model);

    let report = dispatched.value;
    let resilience = report.overall_resilience_score;
    state.leader_mut()?.resilience_score = Some(resilience);

    let threshold = ctx.config.thresholds.resilience_threshold;
    info!(
        resilience,
        threshold,
        attacks = report.attacks.len(),
        model = %dispatched.model,
        "Stress test finished"
    );

    if resilience < threshold {
        let reason = report
            .most_severe()
            .map(|attack| attack.description.clone())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| report.verdict_reason.clone());
        return Err(PipelineError::FailedStressTest { resilience, reason });
    }

    Ok(StagePayload::StressTest {
        resilience_score: resilience,
        attacks: report.attacks.len(),
    })
}
