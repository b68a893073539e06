//! Prompt builders for every model-facing stage.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever a template changes.
//! Builders are pure: the same inputs always produce the same text.

use crate::types::{ArgumentType, DebateContext, ReasoningStrategy, MAX_ARGUMENT_CHARS, MIN_ARGUMENT_CHARS};

pub const PROMPT_VERSION: &str = "1.2.0";

/// The slice of debate context most prompts quote.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub thesis: &'a str,
    pub parent_text: &'a str,
    pub argument_type: ArgumentType,
}

impl<'a> PromptContext<'a> {
    pub fn new(context: &'a DebateContext, argument_type: ArgumentType) -> Self {
        Self {
            thesis: &context.thesis.text,
            parent_text: &context.target.text,
            argument_type,
        }
    }

    fn header(&self, parent_label: &str) -> String {
        format!(
            "DEBATE THESIS:\n\"{}\"\n\n{}:\n\"{}\"\n",
            self.thesis, parent_label, self.parent_text
        )
    }
}

/// One completed search, as replayed to the evidence model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceTurn {
    pub query: String,
    /// Results rendered one per line as `[title](url): snippet`.
    pub results: String,
}

/// Human-readable summary of the debate path for generation prompts.
pub fn context_summary(context: &DebateContext) -> String {
    let mut lines = vec![
        format!("Debate: \"{}\"", context.debate_title),
        format!("Thesis: {}", context.thesis.text),
    ];
    if !context.ancestors.is_empty() {
        let path: Vec<String> = context
            .ancestors
            .iter()
            .map(|a| format!("[{}] {}", a.argument_type, a.text))
            .collect();
        lines.push(format!("Path: {}", path.join(" → ")));
    }
    lines.push(format!(
        "Target: [{}] {}",
        context.target.argument_type, context.target.text
    ));
    lines.push(format!("Existing siblings: {}", context.siblings.len()));
    lines.join("\n")
}

pub fn strategy_selection_prompt(
    ctx: &PromptContext<'_>,
    available: &[ReasoningStrategy],
    count: usize,
) -> String {
    let mut prompt = String::from("You are a debate strategist planning diverse argument generation.\n\n");
    prompt.push_str(&ctx.header("PARENT ARGUMENT TO RESPOND TO"));
    prompt.push_str(&format!(
        "\nDIRECTION: Generate {} arguments.\n\nAVAILABLE REASONING STRATEGIES:\n",
        ctx.argument_type.direction()
    ));
    for (i, s) in available.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", i + 1, s.as_str(), s.description()));
    }
    prompt.push_str(&format!(
        "\nTASK:\nSelect {count} strategies from the list above that would produce the most \
         diverse and effective set of arguments. Order them from most promising to least.\n\n\
         Respond with a JSON object:\n\
         - \"strategies\": array of exactly {count} strategy names from the available list\n"
    ));
    prompt
}

pub fn generation_prompt(
    summary: &str,
    target_text: &str,
    argument_type: ArgumentType,
    strategy: ReasoningStrategy,
    sibling_texts: &[&str],
) -> String {
    let type_instruction = match argument_type {
        ArgumentType::Pro => "supporting (agreeing with)",
        _ => "opposing (disagreeing with)",
    };

    let mut prompt = String::from("You are a debate expert generating structured arguments.\n\n");
    prompt.push_str(&format!("CONTEXT:\n{summary}\n\n"));
    prompt.push_str(&format!("TARGET ARGUMENT TO RESPOND TO:\n\"{target_text}\"\n\n"));
    prompt.push_str(&format!(
        "YOUR TASK:\nGenerate a single {argument_type} argument {type_instruction} the target argument.\n\n"
    ));
    prompt.push_str(&format!(
        "REASONING STRATEGY TO USE:\n{}: {}\n\n",
        strategy.display_name(),
        strategy.description()
    ));
    prompt.push_str(&format!(
        "REQUIREMENTS:\n\
         - The argument must be between {MIN_ARGUMENT_CHARS} and {MAX_ARGUMENT_CHARS} characters\n\
         - Use the specified reasoning strategy\n\
         - Be specific, substantive, and well-reasoned\n\
         - Do not repeat existing arguments\n"
    ));
    if !sibling_texts.is_empty() {
        prompt.push_str("\nExisting arguments on this point (DO NOT repeat these):\n");
        for (i, text) in sibling_texts.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, text));
        }
    }
    prompt.push_str(&format!(
        "\nRespond with a JSON object containing:\n\
         - \"text\": the argument text (string, {MIN_ARGUMENT_CHARS}-{MAX_ARGUMENT_CHARS} chars)\n\
         - \"strategy\": \"{}\" (the reasoning strategy used)\n",
        strategy.as_str()
    ));
    prompt
}

pub fn tournament_vote_prompt(ctx: &PromptContext<'_>, candidate_a: &str, candidate_b: &str) -> String {
    let mut prompt = String::from("You are a debate judge evaluating two candidate arguments.\n\n");
    prompt.push_str(&ctx.header("PARENT ARGUMENT BEING RESPONDED TO"));
    prompt.push_str(&format!(
        "\nBoth candidates are {} the parent argument.\n\n",
        ctx.argument_type.direction()
    ));
    prompt.push_str(&format!("CANDIDATE A:\n\"{candidate_a}\"\n\n"));
    prompt.push_str(&format!("CANDIDATE B:\n\"{candidate_b}\"\n\n"));
    prompt.push_str(
        "TASK:\nCompare these two arguments and pick the stronger one. Consider:\n\
         - Logical coherence and soundness\n\
         - Relevance to the parent argument\n\
         - Novelty and insight\n\
         - Persuasiveness\n\n\
         Respond with a JSON object:\n\
         - \"winner\": \"A\" or \"B\"\n\
         - \"reason\": brief explanation (1-2 sentences)\n",
    );
    prompt
}

pub fn consensus_score_prompt(ctx: &PromptContext<'_>, candidate: &str) -> String {
    let mut prompt = String::from("You are an argument quality evaluator.\n\n");
    prompt.push_str(&ctx.header("PARENT ARGUMENT"));
    prompt.push_str(&format!(
        "\nCANDIDATE ARGUMENT ({} the parent):\n\"{candidate}\"\n\n",
        ctx.argument_type.direction()
    ));
    prompt.push_str(
        "TASK:\nScore this argument on three dimensions from 0.0 to 1.0:\n\n\
         1. novelty: Does this argument offer a fresh perspective? (0.0 = rehash, 1.0 = highly original)\n\
         2. relevance: Does it directly address the parent argument? (0.0 = off-topic, 1.0 = precisely targeted)\n\
         3. logical_strength: Is the reasoning sound and well-structured? (0.0 = fallacious, 1.0 = airtight)\n\n\
         Respond with a JSON object:\n\
         - \"novelty\": number (0.0-1.0)\n\
         - \"relevance\": number (0.0-1.0)\n\
         - \"logical_strength\": number (0.0-1.0)\n",
    );
    prompt
}

pub fn evidence_grounding_prompt(ctx: &PromptContext<'_>, candidate: &str, max_searches: usize) -> String {
    let mut prompt = String::from("You are a research assistant verifying claims in debate arguments.\n\n");
    prompt.push_str(&ctx.header("PARENT ARGUMENT"));
    prompt.push_str(&format!(
        "\nCANDIDATE ARGUMENT ({} the parent):\n\"{candidate}\"\n\n",
        ctx.argument_type.direction()
    ));
    prompt.push_str(&format!(
        "TASK:\nFind evidence to support or verify the claims made in the candidate argument.\n\
         Search for relevant academic papers, news articles, or authoritative sources.\n\
         You may search at most {max_searches} times in total.\n\n\
         Focus on:\n\
         - Specific factual claims that can be verified\n\
         - Statistics or data points mentioned\n\
         - Referenced studies or events\n\n\
         If a claim cannot be verified, list it as unverifiable but do NOT reject the argument.\n\n\
         Respond with exactly one JSON object per turn, either:\n\
         - {{\"action\": \"search\", \"query\": \"<web search query>\"}}\n\
         - {{\"action\": \"finish\", \"summary\": \"<what was verified>\", \"unverifiable_claims\": [\"...\"]}}\n"
    ));
    prompt
}

/// The grounding prompt followed by every search so far and the remaining budget.
pub fn evidence_followup_prompt(initial: &str, turns: &[EvidenceTurn], remaining: usize) -> String {
    let mut prompt = String::from(initial);
    for (i, turn) in turns.iter().enumerate() {
        prompt.push_str(&format!("\nSEARCH {} for \"{}\":\n", i + 1, turn.query));
        if turn.results.trim().is_empty() {
            prompt.push_str("No results found.\n");
        } else {
            prompt.push_str(&turn.results);
            prompt.push('\n');
        }
    }
    if remaining == 0 {
        prompt.push_str("\nNo searches remain. Respond with a \"finish\" action now.\n");
    } else {
        prompt.push_str(&format!(
            "\nSearches remaining: {remaining}. Search again or finish.\n"
        ));
    }
    prompt
}

pub fn stress_test_prompt(ctx: &PromptContext<'_>, candidate: &str, evidence_sources: &[String]) -> String {
    let mut prompt = String::from(
        "You are a rigorous debate adversary. Your goal is to find every weakness in the \
         following argument. A resilient argument should survive your scrutiny.\n\n",
    );
    prompt.push_str(&ctx.header("PARENT ARGUMENT"));
    prompt.push_str(&format!(
        "\nCANDIDATE ARGUMENT ({} the parent):\n\"{candidate}\"\n",
        ctx.argument_type.direction()
    ));
    if evidence_sources.is_empty() {
        prompt.push_str("\nNo evidence sources provided.\n");
    } else {
        prompt.push_str("\nEVIDENCE SOURCES:\n");
        for source in evidence_sources {
            prompt.push_str(&format!("- {source}\n"));
        }
    }
    prompt.push_str(
        "\nTASK:\nGenerate 3 to 5 attacks against this argument. Each attack has one of these types:\n\
         - \"logical-fallacy\": a specific logical fallacy (straw man, false dichotomy, ...)\n\
         - \"counterexample\": a concrete counterexample that undermines the argument\n\
         - \"premise-questioning\": a challenge to a key premise or assumption\n\
         - \"evidence-gap\": missing evidence or unsupported claims\n\
         - \"scope-overreach\": a place where the argument generalizes too broadly\n\n\
         For each attack give a description (1-2 sentences), a severity (0.0 = nitpick, \
         1.0 = devastating) and whether the argument survives it.\n\n\
         Respond with a JSON object:\n\
         - \"attacks\": array of {\"type\", \"description\", \"severity\", \"survivable\"}\n\
         - \"overall_resilience_score\": number (0.0 = demolished, 1.0 = rock solid)\n\
         - \"verdict_reason\": brief verdict (1-2 sentences)\n",
    );
    prompt
}

pub fn refinement_prompt(
    ctx: &PromptContext<'_>,
    candidate: &str,
    evidence_sources: &[String],
    resilience_score: Option<f64>,
) -> String {
    let mut prompt = String::from(
        "You are an expert editor refining a debate argument for maximum clarity and persuasiveness.\n\n",
    );
    prompt.push_str(&ctx.header("PARENT ARGUMENT"));
    prompt.push_str(&format!(
        "\nWINNING ARGUMENT ({} the parent):\n\"{candidate}\"\n",
        ctx.argument_type.direction()
    ));
    if let Some(score) = resilience_score {
        prompt.push_str(&format!(
            "\nResilience score: {score:.2} (from adversarial stress-test)\n"
        ));
    }
    if !evidence_sources.is_empty() {
        prompt.push_str("\nEVIDENCE SOURCES (preserve these references):\n");
        for source in evidence_sources {
            prompt.push_str(&format!("- {source}\n"));
        }
    }
    prompt.push_str(
        "\nCONSTRAINTS:\n\
         - Do NOT add new claims or facts not already present\n\
         - Do NOT change the argument's position or conclusion\n\
         - Do NOT alter the fundamental structure or reasoning approach\n\
         - Do NOT make the argument longer than it is now\n\
         - Preserve all evidence references\n\n\
         IMPROVEMENTS TO MAKE:\n\
         1. Improve sentence clarity and flow\n\
         2. Strengthen word choice for precision\n\
         3. Ensure the argument is self-contained\n\
         4. Fix any grammatical issues\n\
         5. Tighten the argument by removing redundancy\n\n\
         Respond with a JSON object:\n\
         - \"refined_text\": the improved argument text (same length or shorter)\n\
         - \"quality_score\": your assessment of the refined argument's quality (0.0-1.0)\n\
         - \"changes\": brief description of what you changed (1-2 sentences)\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Argument;

    fn arg(id: &str, text: &str, argument_type: ArgumentType) -> Argument {
        Argument {
            id: id.into(),
            text: text.into(),
            argument_type,
            reasoning_strategy: None,
            depth_level: 0,
        }
    }

    fn context() -> DebateContext {
        DebateContext {
            thesis: arg("t", "Remote work improves productivity", ArgumentType::Thesis),
            ancestors: vec![
                arg("a1", "Remote work improves productivity", ArgumentType::Thesis),
                arg("a2", "Offices foster collaboration", ArgumentType::Con),
            ],
            siblings: vec![arg("s1", "Video calls replace hallway chats", ArgumentType::Pro)],
            target: arg("p", "Offices foster collaboration", ArgumentType::Con),
            debate_title: "Remote work".into(),
        }
    }

    #[test]
    fn test_context_summary_lines() {
        let summary = context_summary(&context());
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Debate: \"Remote work\"");
        assert_eq!(lines[1], "Thesis: Remote work improves productivity");
        assert_eq!(
            lines[2],
            "Path: [THESIS] Remote work improves productivity → [CON] Offices foster collaboration"
        );
        assert_eq!(lines[3], "Target: [CON] Offices foster collaboration");
        assert_eq!(lines[4], "Existing siblings: 1");
    }

    #[test]
    fn test_summary_omits_empty_path() {
        let mut ctx = context();
        ctx.ancestors.clear();
        assert!(!context_summary(&ctx).contains("Path:"));
    }

    #[test]
    fn test_generation_prompt_requirements() {
        let p = generation_prompt(
            "summary",
            "Offices foster collaboration",
            ArgumentType::Pro,
            ReasoningStrategy::Empirical,
            &["Video calls replace hallway chats"],
        );
        assert!(p.contains("between 10 and 2000 characters"));
        assert!(p.contains("\"strategy\": \"empirical\""));
        assert!(p.contains("DO NOT repeat these"));
        assert!(p.contains("1. Video calls replace hallway chats"));
        assert!(p.contains("supporting (agreeing with)"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let ctx = context();
        let pc = PromptContext::new(&ctx, ArgumentType::Con);
        assert_eq!(
            tournament_vote_prompt(&pc, "first", "second"),
            tournament_vote_prompt(&pc, "first", "second")
        );
        assert_eq!(
            refinement_prompt(&pc, "x", &[], Some(0.5)),
            refinement_prompt(&pc, "x", &[], Some(0.5))
        );
    }

    #[test]
    fn test_vote_prompt_positions() {
        let ctx = context();
        let pc = PromptContext::new(&ctx, ArgumentType::Con);
        let p = tournament_vote_prompt(&pc, "first text", "second text");
        let a = p.find("CANDIDATE A:\n\"first text\"").unwrap();
        let b = p.find("CANDIDATE B:\n\"second text\"").unwrap();
        assert!(a < b);
        assert!(p.contains("opposing the parent"));
    }

    #[test]
    fn test_evidence_prompt_caps_searches() {
        let ctx = context();
        let pc = PromptContext::new(&ctx, ArgumentType::Pro);
        let p = evidence_grounding_prompt(&pc, "claim", 3);
        assert!(p.contains("at most 3 times"));
        assert!(p.contains("do NOT reject the argument"));
    }

    #[test]
    fn test_followup_lists_turns_and_budget() {
        let turns = vec![
            EvidenceTurn {
                query: "remote productivity study".into(),
                results: "[Study](https://example.org/a): snippet".into(),
            },
            EvidenceTurn {
                query: "nothing".into(),
                results: String::new(),
            },
        ];
        let p = evidence_followup_prompt("BASE", &turns, 1);
        assert!(p.starts_with("BASE"));
        assert!(p.contains("SEARCH 1 for \"remote productivity study\""));
        assert!(p.contains("No results found."));
        assert!(p.contains("Searches remaining: 1"));

        let p = evidence_followup_prompt("BASE", &turns, 0);
        assert!(p.contains("No searches remain"));
    }

    #[test]
    fn test_refinement_prompt_forbids_new_claims() {
        let ctx = context();
        let pc = PromptContext::new(&ctx, ArgumentType::Pro);
        let p = refinement_prompt(&pc, "text", &["https://example.org".into()], Some(0.734));
        assert!(p.contains("Do NOT add new claims"));
        assert!(p.contains("Resilience score: 0.73"));
        assert!(p.contains("- https://example.org"));
    }

    #[test]
    fn test_strategy_prompt_lists_all() {
        let ctx = context();
        let pc = PromptContext::new(&ctx, ArgumentType::Pro);
        let p = strategy_selection_prompt(&pc, &ReasoningStrategy::ALL, 5);
        assert!(p.contains("7. definitional"));
        assert!(p.contains("exactly 5 strategy names"));
    }
}
