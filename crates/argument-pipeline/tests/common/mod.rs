//! Scripted collaborators for end-to-end pipeline runs.
//!
//! `ScriptedClient` answers by recognising which stage built the prompt, so a
//! whole run can be driven without a model server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use argument_pipeline::errors::{EmbedError, ModelCallError, SearchError};
use argument_pipeline::providers::{Embedder, GenerateOptions, ModelClient, SearchResult, WebSearch};
use argument_pipeline::{Collaborators, Orchestrator};
use async_trait::async_trait;
use debate_coordination::config::PipelineConfig;
use debate_coordination::types::{
    Argument, ArgumentType, DebateContext, PipelineInput, ReasoningStrategy, Tier,
};
use regex::Regex;
use serde_json::json;

static STRATEGY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""strategy": "([a-z]+)""#).expect("strategy tag regex should compile")
});

pub const REFINED_TEXT: &str = "Car bans tax shift workers beyond transit.";
pub const SOURCES: [&str; 2] = [
    "https://example.org/transit-access-study",
    "https://example.org/commute-cost-survey",
];

/// Counts futures dropped before they finished.
struct DropCounter {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl DropCounter {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        Self {
            counter,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct ScriptedClient {
    /// Score every consensus judge gives; `None` answers with prose.
    pub consensus: Option<f64>,
    pub resilience: f64,
    pub refinement_quality: f64,
    /// Tournament judges sleep this long before voting.
    pub judge_delay: Option<Duration>,
    /// Consensus judges on this model never answer.
    pub stalled_judge: Option<&'static str>,
    /// The research assistant never answers.
    pub stalled_evidence: bool,
    pub calls: AtomicUsize,
    pub judges_started: AtomicUsize,
    pub judges_dropped: Arc<AtomicUsize>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self {
            consensus: Some(0.8),
            resilience: 0.8,
            refinement_quality: 0.9,
            judge_delay: None,
            stalled_judge: None,
            stalled_evidence: false,
            calls: AtomicUsize::new(0),
            judges_started: AtomicUsize::new(0),
            judges_dropped: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ScriptedClient {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn judges_started(&self) -> usize {
        self.judges_started.load(Ordering::SeqCst)
    }

    pub fn judges_dropped(&self) -> usize {
        self.judges_dropped.load(Ordering::SeqCst)
    }

    async fn tournament_vote(&self) -> String {
        if let Some(delay) = self.judge_delay {
            self.judges_started.fetch_add(1, Ordering::SeqCst);
            let guard = DropCounter::new(self.judges_dropped.clone());
            tokio::time::sleep(delay).await;
            guard.disarm();
        }
        json!({"winner": "A", "reason": "more specific"}).to_string()
    }
}

fn generated(prompt: &str) -> String {
    let strategy = STRATEGY_TAG_RE
        .captures(prompt)
        .and_then(|c| c.get(1))
        .map_or("logical", |m| m.as_str());
    json!({
        "text": format!(
            "On {strategy} grounds, a downtown car ban shifts commuting costs onto shift workers who live beyond transit reach."
        ),
        "strategy": strategy,
    })
    .to_string()
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _options: GenerateOptions,
    ) -> Result<String, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let answer = if prompt.starts_with("You are a debate strategist") {
            let names: Vec<&str> = ReasoningStrategy::ALL
                .iter()
                .take(5)
                .map(|s| s.as_str())
                .collect();
            json!({ "strategies": names }).to_string()
        } else if prompt.starts_with("You are a debate expert") {
            generated(prompt)
        } else if prompt.starts_with("You are a debate judge") {
            self.tournament_vote().await
        } else if prompt.starts_with("You are an argument quality evaluator") {
            if self.stalled_judge.is_some_and(|m| m == model) {
                std::future::pending::<()>().await;
            }
            match self.consensus {
                Some(score) => json!({
                    "novelty": score,
                    "relevance": score,
                    "logical_strength": score,
                })
                .to_string(),
                None => "The argument seems fine to me.".to_string(),
            }
        } else if prompt.starts_with("You are a research assistant") {
            if self.stalled_evidence {
                std::future::pending::<()>().await;
            }
            if prompt.contains("\nSEARCH 1 for") {
                json!({"action": "finish", "summary": "Commute costs verified", "unverifiable_claims": []})
                    .to_string()
            } else {
                json!({"action": "search", "query": "downtown car ban commute costs"}).to_string()
            }
        } else if prompt.starts_with("You are a rigorous debate adversary") {
            json!({
                "attacks": [
                    {"type": "counterexample", "description": "Transit subsidies can offset the cost.", "severity": 0.4, "survivable": true},
                    {"type": "evidence-gap", "description": "No data on how many workers are affected.", "severity": 0.7, "survivable": false},
                ],
                "overall_resilience_score": self.resilience,
                "verdict_reason": "Plausible but thinly sourced.",
            })
            .to_string()
        } else if prompt.starts_with("You are an expert editor") {
            json!({
                "refined_text": REFINED_TEXT,
                "quality_score": self.refinement_quality,
                "changes": "Tightened wording.",
            })
            .to_string()
        } else {
            return Err(ModelCallError::InvalidResponse {
                model: model.to_string(),
                message: "unrecognised prompt".into(),
            });
        };
        Ok(answer)
    }
}

/// Returns the same vector for every text.
pub struct FixedEmbedder {
    vector: Vec<f64>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f64>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

pub struct FixedSearch;

#[async_trait]
impl WebSearch for FixedSearch {
    async fn search(&self, _query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        Ok(SOURCES
            .iter()
            .take(count)
            .map(|url| SearchResult {
                title: "Commuting study".into(),
                url: (*url).into(),
                snippet: "Shift workers travel furthest.".into(),
            })
            .collect())
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub client: Arc<ScriptedClient>,
    pub embedder: Arc<FixedEmbedder>,
}

pub fn harness(config: PipelineConfig, client: ScriptedClient) -> Harness {
    let client = Arc::new(client);
    let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
    let orchestrator = Orchestrator::from_config(
        config,
        Collaborators {
            client: client.clone(),
            embedder: embedder.clone(),
            search: Arc::new(FixedSearch),
        },
    );
    Harness {
        orchestrator,
        client,
        embedder,
    }
}

fn argument(id: &str, text: &str, argument_type: ArgumentType, depth_level: u32) -> Argument {
    Argument {
        id: id.into(),
        text: text.into(),
        argument_type,
        reasoning_strategy: None,
        depth_level,
    }
}

pub fn sibling(id: &str, strategy: ReasoningStrategy) -> Argument {
    Argument {
        reasoning_strategy: Some(strategy),
        ..argument(
            id,
            "Downtown car bans hurt small retailers who rely on drive-in customers.",
            ArgumentType::Con,
            2,
        )
    }
}

pub fn input(tier: Tier, siblings: Vec<Argument>) -> PipelineInput {
    PipelineInput {
        context: DebateContext {
            thesis: argument(
                "thesis-1",
                "Cities should ban private cars from their centres.",
                ArgumentType::Thesis,
                0,
            ),
            ancestors: vec![],
            siblings,
            target: argument(
                "arg-7",
                "Car bans cut emissions and make streets safer.",
                ArgumentType::Pro,
                1,
            ),
            debate_title: "Car-free city centres".into(),
        },
        parent_id: "arg-7".into(),
        argument_type: ArgumentType::Con,
        debate_id: "debate-42".into(),
        tier,
        preferred_strategy: None,
        sibling_embeddings: None,
    }
}
