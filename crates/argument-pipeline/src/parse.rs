//! Fail-closed parsers for model output.
//!
//! Models wrap JSON in prose or markdown fences more often than not. Every
//! parser here extracts the first JSON object, decodes it into a typed
//! shape and validates bounds. A `ParseError` becomes
//! `MalformedModelOutput` in dispatch and is retried once.

use std::sync::LazyLock;

use debate_coordination::ensemble::JudgeVote;
use debate_coordination::scoring::Side;
use debate_coordination::types::{
    argument_length_ok, ReasoningStrategy, MAX_ARGUMENT_CHARS, MIN_ARGUMENT_CHARS,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("JSON_FENCE_RE regex should compile")
});

/// Reasoning models emit `<think>...</think>` before the answer.
static THINK_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("THINK_BLOCK_RE regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Locate the JSON object in a model response.
///
/// Preference order: fenced block, then first `{` to last `}`.
pub fn extract_json(raw: &str) -> Option<String> {
    let cleaned = THINK_BLOCK_RE.replace_all(raw, "");
    if let Some(caps) = JSON_FENCE_RE.captures(&cleaned) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    (end > start).then(|| cleaned[start..=end].to_string())
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let json = extract_json(raw).ok_or_else(|| ParseError::new("no JSON object in response"))?;
    serde_json::from_str(&json).map_err(|e| ParseError(format!("invalid JSON shape: {e}")))
}

fn unit_interval(name: &str, value: f64) -> Result<f64, ParseError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParseError(format!("{name} {value} outside [0, 1]")))
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StrategySelection {
    strategies: Vec<String>,
}

/// Known strategy names in the order given, unknown names and repeats
/// dropped. Fewer than `count` valid names is an error.
pub fn parse_strategy_selection(
    raw: &str,
    count: usize,
) -> Result<Vec<ReasoningStrategy>, ParseError> {
    let selection: StrategySelection = decode(raw)?;
    let mut picked = Vec::with_capacity(count);
    for name in &selection.strategies {
        if let Some(s) = ReasoningStrategy::parse(name) {
            if !picked.contains(&s) {
                picked.push(s);
            }
        }
    }
    if picked.len() < count {
        return Err(ParseError(format!(
            "{} valid strategies, {count} required",
            picked.len()
        )));
    }
    picked.truncate(count);
    Ok(picked)
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GeneratedArgument {
    text: String,
    strategy: String,
}

/// Generated argument text, checked for length and strategy tag.
pub fn parse_generated_argument(
    raw: &str,
    expected: ReasoningStrategy,
) -> Result<String, ParseError> {
    let generated: GeneratedArgument = decode(raw)?;
    let text = generated.text.trim().to_string();
    if !argument_length_ok(&text) {
        return Err(ParseError(format!(
            "argument is {} chars, must be {MIN_ARGUMENT_CHARS}-{MAX_ARGUMENT_CHARS}",
            text.chars().count()
        )));
    }
    match ReasoningStrategy::parse(&generated.strategy) {
        Some(tag) if tag == expected => Ok(text),
        _ => Err(ParseError(format!(
            "strategy tag {:?} does not match requested {}",
            generated.strategy,
            expected.as_str()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tournament
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TournamentVote {
    winner: String,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

/// The side the judge preferred, as presented in the prompt.
pub fn parse_tournament_vote(raw: &str) -> Result<Side, ParseError> {
    let vote: TournamentVote = decode(raw)?;
    match vote.winner.trim().to_ascii_uppercase().as_str() {
        "A" => Ok(Side::A),
        "B" => Ok(Side::B),
        other => Err(ParseError(format!("winner must be \"A\" or \"B\", got {other:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConsensusScore {
    novelty: f64,
    relevance: f64,
    logical_strength: f64,
}

pub fn parse_consensus_score(raw: &str) -> Result<JudgeVote, ParseError> {
    let score: ConsensusScore = decode(raw)?;
    Ok(JudgeVote::new(
        unit_interval("novelty", score.novelty)?,
        unit_interval("relevance", score.relevance)?,
        unit_interval("logical_strength", score.logical_strength)?,
    ))
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// One turn of the evidence tool-call loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EvidenceAction {
    Search {
        query: String,
    },
    Finish {
        #[serde(default)]
        summary: String,
        #[serde(default)]
        unverifiable_claims: Vec<String>,
    },
}

pub fn parse_evidence_action(raw: &str) -> Result<EvidenceAction, ParseError> {
    let action: EvidenceAction = decode(raw)?;
    if let EvidenceAction::Search { query } = &action {
        if query.trim().is_empty() {
            return Err(ParseError::new("search query is empty"));
        }
    }
    Ok(action)
}

// ---------------------------------------------------------------------------
// Stress test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attack {
    #[serde(rename = "type")]
    pub attack_type: String,
    pub description: String,
    pub severity: f64,
    #[serde(default)]
    pub survivable: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StressTestReport {
    pub attacks: Vec<Attack>,
    pub overall_resilience_score: f64,
    #[serde(default)]
    pub verdict_reason: String,
}

impl StressTestReport {
    /// Highest-severity attack; earliest wins ties.
    pub fn most_severe(&self) -> Option<&Attack> {
        self.attacks.iter().fold(None, |best: Option<&Attack>, a| match best {
            Some(b) if b.severity >= a.severity => Some(b),
            _ => Some(a),
        })
    }
}

pub fn parse_stress_test(raw: &str) -> Result<StressTestReport, ParseError> {
    let report: StressTestReport = decode(raw)?;
    unit_interval("overall_resilience_score", report.overall_resilience_score)?;
    if report.attacks.is_empty() {
        return Err(ParseError::new("stress test produced no attacks"));
    }
    for attack in &report.attacks {
        unit_interval("attack severity", attack.severity)?;
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Refinement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Refinement {
    pub refined_text: String,
    pub quality_score: f64,
    #[serde(default)]
    pub changes: String,
}

/// Refined text must stay within bounds and not grow past `original`.
/// The quality score is clamped into [0, 1].
pub fn parse_refinement(raw: &str, original: &str) -> Result<Refinement, ParseError> {
    let mut refinement: Refinement = decode(raw)?;
    refinement.refined_text = refinement.refined_text.trim().to_string();
    let refined_chars = refinement.refined_text.chars().count();
    if !argument_length_ok(&refinement.refined_text) {
        return Err(ParseError(format!(
            "refined text is {refined_chars} chars, must be {MIN_ARGUMENT_CHARS}-{MAX_ARGUMENT_CHARS}"
        )));
    }
    let original_chars = original.chars().count();
    if refined_chars > original_chars {
        return Err(ParseError(format!(
            "refined text grew from {original_chars} to {refined_chars} chars"
        )));
    }
    if !refinement.quality_score.is_finite() {
        return Err(ParseError::new("quality_score is not a number"));
    }
    refinement.quality_score = refinement.quality_score.clamp(0.0, 1.0);
    Ok(refinement)
}
