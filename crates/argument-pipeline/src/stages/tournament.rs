//! Stage 4: pairwise Elo tournament.
//!
//! Every pair from `generate_pairs` gets `votes_per_pair` judge calls, all in
//! flight together (the limiter bounds real concurrency). Odd-numbered votes
//! present the pair swapped to cancel position bias. Ratings are updated in
//! schedule order once all votes are in, so the result does not depend on
//! which judge answered first.

use debate_coordination::events::PipelineEvent;
use debate_coordination::prompts::tournament_vote_prompt;
use debate_coordination::scoring::{generate_pairs, majority, Side, Tournament};
use debate_coordination::types::{StageName, StagePayload};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{RunState, StageContext};
use crate::errors::PipelineError;
use crate::parse::parse_tournament_vote;

type VoteOutcome = (usize, Result<(Side, String), PipelineError>);

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let pairs = generate_pairs(state.candidates.len());
    let prompt_ctx = ctx.prompt_context();
    let votes_per_pair = ctx.config.limits.votes_per_pair;

    let mut join_set: JoinSet<VoteOutcome> = JoinSet::new();
    for (pair_index, &(a, b)) in pairs.iter().enumerate() {
        for vote in 0..votes_per_pair {
            let swapped = vote % 2 == 1;
            let (first, second) = if swapped { (b, a) } else { (a, b) };
            let prompt = tournament_vote_prompt(
                &prompt_ctx,
                &state.candidates[first].text,
                &state.candidates[second].text,
            );
            let dispatcher = ctx.dispatcher.clone();
            let scope = ctx.scope(StageName::Tournament);
            join_set.spawn(async move {
                let result = dispatcher
                    .call(scope, &prompt, parse_tournament_vote)
                    .await
                    .map(|d| {
                        // Back to the schedule's orientation.
                        let side = if swapped { d.value.flipped() } else { d.value };
                        (side, d.model)
                    });
                (pair_index, result)
            });
        }
    }

    let mut ballots: Vec<Vec<Side>> = vec![Vec::new(); pairs.len()];
    let mut judges: Vec<String> = Vec::new();
    let mut pool_exhausted = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((pair_index, Ok((side, model)))) => {
                ballots[pair_index].push(side);
                judges.push(model);
            }
            Ok((pair_index, Err(e))) => {
                debug!(pair = pair_index, error = %e, "Tournament vote lost");
                if matches!(e, PipelineError::PoolExhausted { .. }) {
                    pool_exhausted = Some(e);
                }
            }
            Err(e) => warn!(error = %e, "Tournament judge panicked"),
        }
    }
    for model in &judges {
        state.record_model(model);
    }

    let total_votes: usize = ballots.iter().map(Vec::len).sum();
    if total_votes == 0 {
        return Err(pool_exhausted.unwrap_or(PipelineError::NoTournamentVotes));
    }

    let mut tournament = Tournament::new(
        state.candidates.len(),
        ctx.config.thresholds.elo_initial,
        ctx.config.thresholds.elo_k_factor,
    );
    for (&(a, b), votes) in pairs.iter().zip(&ballots) {
        let Some(side) = majority(votes) else {
            warn!(a, b, "Pair received no votes, ratings unchanged");
            continue;
        };
        let (winner, loser) = match side {
            Side::A => (a, b),
            Side::B => (b, a),
        };
        tournament.record(winner, loser);
        ctx.sink.emit(PipelineEvent::TournamentRound {
            winner: state.candidates[winner].id,
            loser: state.candidates[loser].id,
            votes: votes.len(),
        });
    }

    for (candidate, rating) in state.candidates.iter_mut().zip(tournament.ratings()) {
        candidate.elo_rating = *rating;
    }

    let standings = tournament.standings();
    let advanced: Vec<_> = standings
        .iter()
        .take(ctx.config.limits.advance_count)
        .map(|&i| state.candidates[i].id)
        .collect();
    let leader_index = tournament.leader().ok_or(PipelineError::InsufficientCandidates {
        got: 0,
        need: ctx.config.limits.min_candidates,
    })?;
    let leader = state.candidates[leader_index].clone();

    info!(
        matches = tournament.matches(),
        votes = total_votes,
        leader = %leader.id,
        rating = leader.elo_rating,
        strategy = %leader.strategy.as_str(),
        "Tournament finished"
    );

    let payload = StagePayload::Tournament {
        matches: tournament.matches(),
        votes: total_votes,
        leader: leader.id,
        advanced,
    };
    state.leader = Some(leader);
    Ok(payload)
}
