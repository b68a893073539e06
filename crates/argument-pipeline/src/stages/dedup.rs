//! Stage 6: semantic dedup of the leader against existing siblings.

use debate_coordination::ensemble::find_duplicate;
use debate_coordination::types::StagePayload;
use tracing::{debug, info};

use super::{RunState, StageContext};
use crate::errors::PipelineError;

pub async fn run(
    ctx: &StageContext<'_>,
    state: &mut RunState,
) -> Result<StagePayload, PipelineError> {
    let siblings = &ctx.input.context.siblings;
    if siblings.is_empty() {
        debug!("No siblings, dedup trivially passes");
        state.leader_mut()?.max_similarity = Some(0.0);
        return Ok(StagePayload::Dedup {
            siblings_compared: 0,
            max_similarity: 0.0,
        });
    }

    let sibling_vectors = match &ctx.input.sibling_embeddings {
        Some(vectors) => vectors.clone(),
        None => {
            let mut vectors = Vec::with_capacity(siblings.len());
            for sibling in siblings {
                vectors.push(ctx.embedder.embed(&sibling.text).await?);
            }
            vectors
        }
    };
    let candidate_vector = ctx.embedder.embed(&state.leader()?.text).await?;

    let threshold = ctx.config.thresholds.dedup_similarity;
    let report = find_duplicate(&candidate_vector, &sibling_vectors, threshold)?;
    state.leader_mut()?.max_similarity = Some(report.max_similarity);

    if let Some(dup) = report.duplicate {
        let sibling_id = siblings
            .get(dup.sibling_index)
            .map(|s| s.id.clone())
            .unwrap_or_default();
        info!(sibling = %sibling_id, similarity = dup.similarity, threshold, "Leader duplicates a sibling");
        return Err(PipelineError::DuplicateArgument {
            sibling_id,
            similarity: dup.similarity,
        });
    }

    Ok(StagePayload::Dedup {
        siblings_compared: report.compared,
        max_similarity: report.max_similarity,
    })
}
