//! Stage 1: context extraction. Validation and summary only, no model call.

use debate_coordination::prompts::context_summary;
use debate_coordination::types::{
    argument_length_ok, Argument, PipelineInput, StagePayload, MAX_ARGUMENT_CHARS,
    MIN_ARGUMENT_CHARS,
};
use tracing::debug;

use super::{RunState, StageContext};
use crate::errors::PipelineError;

pub fn run(ctx: &StageContext<'_>, state: &mut RunState) -> Result<StagePayload, PipelineError> {
    validate(ctx.input)?;
    state.summary = context_summary(&ctx.input.context);
    debug!(chars = state.summary.len(), "Context summary built");
    Ok(StagePayload::Context {
        summary_chars: state.summary.chars().count(),
        sibling_count: ctx.input.context.siblings.len(),
    })
}

pub fn validate(input: &PipelineInput) -> Result<(), PipelineError> {
    let context = &input.context;
    if context.debate_title.trim().is_empty() {
        return Err(PipelineError::InvalidContext("debate title is empty".into()));
    }
    if input.parent_id.trim().is_empty() || input.debate_id.trim().is_empty() {
        return Err(PipelineError::InvalidContext(
            "parent id and debate id are required".into(),
        ));
    }

    check_argument("thesis", &context.thesis)?;
    check_argument("target", &context.target)?;
    for arg in &context.ancestors {
        check_argument("ancestor", arg)?;
    }
    for arg in &context.siblings {
        check_argument("sibling", arg)?;
    }

    if let Some(embeddings) = &input.sibling_embeddings {
        if embeddings.len() != context.siblings.len() {
            return Err(PipelineError::InvalidContext(format!(
                "{} sibling embeddings for {} siblings",
                embeddings.len(),
                context.siblings.len()
            )));
        }
    }
    Ok(())
}

fn check_argument(role: &str, arg: &Argument) -> Result<(), PipelineError> {
    if arg.id.trim().is_empty() {
        return Err(PipelineError::InvalidContext(format!("{role} argument has no id")));
    }
    if !argument_length_ok(&arg.text) {
        return Err(PipelineError::InvalidContext(format!(
            "{role} argument {} is {} chars, must be {MIN_ARGUMENT_CHARS}-{MAX_ARGUMENT_CHARS}",
            arg.id,
            arg.text.chars().count()
        )));
    }
    Ok(())
}
