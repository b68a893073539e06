//! Stage 5: ensemble consensus on the tournament leader.
//!
//! `consensus_judges` rotated models score the leader concurrently. A judge
//! that fails, times out or returns garbage abstains; the tally decides.

use debate_coordination::ensemble::{tally, ConsensusPolicy, JudgeBallot};
use debate_coordination::prompts::consensus_score_prompt;
use debate_coordination::types::{StageName, StagePayload};
use tokio::task::JoinSet;
use tokio::time::timeout_at;
use tracing::{info, warn};

use super::{RunState, StageContext};
use crate::dispatch::CallScope;
use crate::errors::PipelineError;
use crate::parse::parse_consensus_score;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let prompt = consensus_score_prompt(&ctx.prompt_context(), &state.leader()?.text);
    let judges = ctx.config.thresholds.consensus_judges;

    // Judges stop before the stage timeout so the tally still runs.
    let judge_deadline = ctx.wind_down_deadline();
    let scope = CallScope::within(StageName::EnsembleConsensus, judge_deadline);

    let mut join_set = JoinSet::new();
    for _ in 0..judges {
        let dispatcher = ctx.dispatcher.clone();
        let prompt = prompt.clone();
        join_set.spawn(async move {
            timeout_at(
                judge_deadline,
                dispatcher.call(scope, &prompt, parse_consensus_score),
            )
            .await
        });
    }

    let mut ballots = Vec::with_capacity(judges);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(Ok(dispatched))) => {
                state.record_model(&dispatched.model);
                ballots.push(JudgeBallot::Vote(dispatched.value));
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Judge abstained");
                ballots.push(JudgeBallot::Abstain);
            }
            Ok(Err(_)) => {
                warn!("Judge did not answer before the stage deadline, counted as abstention");
                ballots.push(JudgeBallot::Abstain);
            }
            Err(e) => {
                warn!(error = %e, "Judge worker panicked, counted as abstention");
                ballots.push(JudgeBallot::Abstain);
            }
        }
    }

    let policy = ConsensusPolicy::from_thresholds(&ctx.config.thresholds);
    let verdict = tally(&ballots, &policy)?;

    let scores = verdict.medians;
    state.consensus = Some(scores);
    state.leader_mut()?.consensus_scores = Some(scores);

    info!(
        responded = verdict.responded,
        abstained = verdict.abstained,
        passing_votes = verdict.passing_votes,
        passed = verdict.passed,
        "Consensus tallied"
    );

    if !verdict.passed {
        return Err(PipelineError::QualityGate {
            passing_votes: verdict.passing_votes,
            required: policy.min_votes,
        });
    }

    Ok(StagePayload::Consensus {
        responded: verdict.responded,
        abstained: verdict.abstained,
        passing_votes: verdict.passing_votes,
        passed: verdict.passed,
    })
}
