//! Evidence grounding: search adapter and the bounded tool-call loop.
//!
//! The loop is an explicit counter, not recursion: the model asks for a
//! search, the adapter runs it, the results are replayed in a follow-up
//! prompt, and so on until the model finishes or the search budget is
//! spent. Nothing here can fail a run: past its deadline the loop stops
//! and keeps the sources gathered so far.

use std::future::Future;
use std::sync::Arc;

use debate_coordination::prompts::{
    evidence_followup_prompt, evidence_grounding_prompt, EvidenceTurn, PromptContext,
};
use debate_coordination::resilience::{DegradationLevel, DegradedResponse};
use debate_coordination::types::StageName;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::dispatch::{CallScope, Dispatcher};
use crate::parse::{parse_evidence_action, EvidenceAction};
use crate::providers::{SearchResult, WebSearch, MAX_SEARCH_RESULTS};

/// Wraps a [`WebSearch`] so callers always get a (possibly empty) list.
#[derive(Clone)]
pub struct SearchAdapter {
    backend: Arc<dyn WebSearch>,
    results_per_search: usize,
}

impl SearchAdapter {
    pub fn new(backend: Arc<dyn WebSearch>, results_per_search: usize) -> Self {
        Self {
            backend,
            results_per_search: results_per_search.clamp(1, MAX_SEARCH_RESULTS),
        }
    }

    pub async fn search(&self, query: &str) -> DegradedResponse<Vec<SearchResult>> {
        match self.backend.search(query, self.results_per_search).await {
            Ok(mut results) => {
                let returned = results.len();
                results.retain(|r| r.url.starts_with("https://") || r.url.starts_with("http://"));
                let dropped = returned - results.len();
                results.truncate(self.results_per_search);
                let response = DegradedResponse::full(results, "web-search");
                if dropped > 0 {
                    debug!(query, dropped, "Dropped results without a usable URL");
                    response.degrade(
                        DegradationLevel::Partial,
                        format!("{dropped} results had no usable URL"),
                    )
                } else {
                    response
                }
            }
            Err(e) => {
                warn!(query, error = %e, "Web search unavailable, continuing without evidence");
                DegradedResponse::empty(e.to_string())
            }
        }
    }
}

/// What one grounding pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceOutcome {
    /// Unique URLs in first-seen order.
    pub sources: Vec<String>,
    pub searches: usize,
    pub unverifiable_claims: Vec<String>,
    pub summary: Option<String>,
    /// Models that answered, one entry per turn.
    pub models: Vec<String>,
    /// Set when the model or search backend failed along the way, or the
    /// deadline cut the loop short.
    pub degraded: bool,
}

impl EvidenceOutcome {
    fn add_sources(&mut self, results: &[SearchResult], cap: usize) {
        for result in results {
            if self.sources.len() >= cap {
                return;
            }
            if !self.sources.iter().any(|u| u == &result.url) {
                self.sources.push(result.url.clone());
            }
        }
    }
}

pub struct EvidenceLoop<'a> {
    dispatcher: &'a Dispatcher,
    search: &'a SearchAdapter,
    /// Pinned evaluator model, if the tier has one.
    model: Option<&'a str>,
    max_searches: usize,
    max_sources: usize,
    deadline: Option<Instant>,
}

impl<'a> EvidenceLoop<'a> {
    pub fn new(
        dispatcher: &'a Dispatcher,
        search: &'a SearchAdapter,
        model: Option<&'a str>,
        max_searches: usize,
        max_sources: usize,
    ) -> Self {
        Self {
            dispatcher,
            search,
            model,
            max_searches,
            max_sources,
            deadline: None,
        }
    }

    /// Stop at `deadline`, keeping whatever was gathered.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    async fn before_deadline<F: Future>(&self, work: F) -> Option<F::Output> {
        match self.deadline {
            Some(deadline) => timeout_at(deadline, work).await.ok(),
            None => Some(work.await),
        }
    }

    pub async fn run(&self, ctx: &PromptContext<'_>, candidate: &str) -> EvidenceOutcome {
        let initial = evidence_grounding_prompt(ctx, candidate, self.max_searches);
        let mut outcome = EvidenceOutcome::default();
        let mut turns: Vec<EvidenceTurn> = Vec::new();

        loop {
            let prompt = if turns.is_empty() {
                initial.clone()
            } else {
                evidence_followup_prompt(&initial, &turns, self.max_searches - outcome.searches)
            };

            let scope = CallScope {
                stage: StageName::EvidenceGrounding,
                deadline: self.deadline,
            };
            let call = self
                .dispatcher
                .call_role(self.model, scope, &prompt, parse_evidence_action);
            let action = match self.before_deadline(call).await {
                Some(Ok(dispatched)) => {
                    outcome.models.push(dispatched.model);
                    dispatched.value
                }
                Some(Err(e)) => {
                    warn!(error = %e, searches = outcome.searches, "Evidence model failed, keeping gathered sources");
                    outcome.degraded = true;
                    break;
                }
                None => {
                    warn!(searches = outcome.searches, "Evidence deadline reached, keeping gathered sources");
                    outcome.degraded = true;
                    break;
                }
            };

            match action {
                EvidenceAction::Finish {
                    summary,
                    unverifiable_claims,
                } => {
                    outcome.summary = Some(summary).filter(|s| !s.trim().is_empty());
                    outcome.unverifiable_claims = unverifiable_claims;
                    break;
                }
                EvidenceAction::Search { query } => {
                    if outcome.searches >= self.max_searches {
                        debug!(query = %query, "Search budget spent, ending evidence loop");
                        break;
                    }
                    outcome.searches += 1;
                    let Some(response) = self.before_deadline(self.search.search(&query)).await
                    else {
                        warn!(query = %query, "Evidence deadline reached during search, keeping gathered sources");
                        outcome.degraded = true;
                        break;
                    };
                    if response.is_degraded() {
                        outcome.degraded = true;
                    }
                    let results = response.into_payload();
                    outcome.add_sources(&results, self.max_sources);
                    turns.push(EvidenceTurn {
                        query,
                        results: results
                            .iter()
                            .map(SearchResult::to_markdown)
                            .collect::<Vec<_>>()
                            .join("\n"),
                    });
                }
            }
        }

        info!(
            searches = outcome.searches,
            sources = outcome.sources.len(),
            degraded = outcome.degraded,
            "Evidence grounding finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use debate_coordination::config::{ModelConfigTable, RetryPolicy};
    use debate_coordination::limiter::CallLimiter;
    use debate_coordination::registry::ModelRegistry;
    use debate_coordination::types::ArgumentType;

    use super::*;
    use crate::errors::{ModelCallError, SearchError};
    use crate::providers::{MockModelClient, MockWebSearch, NoSearch};

    const CANDIDATE: &str = "Carbon taxes reduce emissions without picking winners.";

    fn prompt_ctx() -> PromptContext<'static> {
        PromptContext {
            thesis: "Governments should price carbon.",
            parent_text: "Carbon pricing hurts the poor.",
            argument_type: ArgumentType::Con,
        }
    }

    fn dispatcher(client: MockModelClient) -> Dispatcher {
        Dispatcher::new(
            ModelRegistry::shared(["m1", "m2", "m3"]),
            Arc::new(client),
            CallLimiter::new(1),
            ModelConfigTable::default(),
            RetryPolicy::default(),
        )
    }

    fn result(url: &str) -> SearchResult {
        SearchResult {
            title: "Source".into(),
            url: url.into(),
            snippet: "snippet".into(),
        }
    }

    #[tokio::test]
    async fn test_adapter_degrades_to_empty() {
        let adapter = SearchAdapter::new(Arc::new(NoSearch), 3);
        let response = adapter.search("anything").await;
        assert!(response.is_degraded());
        assert!(response.into_payload().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_clamps_count() {
        let mut search = MockWebSearch::new();
        search
            .expect_search()
            .withf(|_, count| *count == MAX_SEARCH_RESULTS)
            .returning(|_, _| Ok(vec![]));
        let adapter = SearchAdapter::new(Arc::new(search), 50);
        assert!(adapter.search("q").await.is_full());
    }

    #[tokio::test]
    async fn test_adapter_drops_results_without_url() {
        let mut search = MockWebSearch::new();
        search.expect_search().returning(|_, _| {
            Ok(vec![result("https://a.org"), result("ftp://b.org"), result("")])
        });
        let adapter = SearchAdapter::new(Arc::new(search), 3);
        let response = adapter.search("q").await;
        assert_eq!(response.level, DegradationLevel::Partial);
        assert_eq!(response.into_payload(), vec![result("https://a.org")]);
    }

    #[tokio::test]
    async fn test_loop_bounded_to_max_searches() {
        let model_calls = Arc::new(AtomicUsize::new(0));
        let counter = model_calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |_, _, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!(r#"{{"action":"search","query":"query {n}"}}"#))
        });
        let mut search = MockWebSearch::new();
        search
            .expect_search()
            .times(3)
            .returning(|query, _| Ok(vec![result(&format!("https://example.org/{query}"))]));

        let d = dispatcher(client);
        let adapter = SearchAdapter::new(Arc::new(search), 3);
        let outcome = EvidenceLoop::new(&d, &adapter, None, 3, 3)
            .run(&prompt_ctx(), CANDIDATE)
            .await;

        assert_eq!(outcome.searches, 3);
        assert_eq!(outcome.sources.len(), 3);
        // Three searches, then one last turn that still asked to search.
        assert_eq!(model_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_sources_deduplicated_by_url() {
        let model_calls = Arc::new(AtomicUsize::new(0));
        let counter = model_calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |_, _, _| {
            Ok(match counter.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => r#"{"action":"search","query":"same topic"}"#.to_string(),
                _ => r#"{"action":"finish","summary":"verified","unverifiable_claims":["claim x"]}"#
                    .to_string(),
            })
        });
        let mut search = MockWebSearch::new();
        search.expect_search().returning(|_, _| {
            Ok(vec![result("https://a.org"), result("https://b.org"), result("https://a.org")])
        });

        let d = dispatcher(client);
        let adapter = SearchAdapter::new(Arc::new(search), 3);
        let outcome = EvidenceLoop::new(&d, &adapter, None, 3, 3)
            .run(&prompt_ctx(), CANDIDATE)
            .await;

        assert_eq!(outcome.sources, vec!["https://a.org", "https://b.org"]);
        assert_eq!(outcome.searches, 2);
        assert_eq!(outcome.unverifiable_claims, vec!["claim x"]);
        assert_eq!(outcome.summary.as_deref(), Some("verified"));
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_partial_evidence() {
        let model_calls = Arc::new(AtomicUsize::new(0));
        let counter = model_calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |model, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(r#"{"action":"search","query":"first"}"#.to_string())
            } else {
                Err(ModelCallError::Transport {
                    model: model.to_string(),
                    message: "down".into(),
                })
            }
        });
        let mut search = MockWebSearch::new();
        search
            .expect_search()
            .returning(|_, _| Ok(vec![result("https://kept.org")]));

        let d = dispatcher(client);
        let adapter = SearchAdapter::new(Arc::new(search), 3);
        let outcome = EvidenceLoop::new(&d, &adapter, None, 3, 3)
            .run(&prompt_ctx(), CANDIDATE)
            .await;

        assert_eq!(outcome.sources, vec!["https://kept.org"]);
        assert!(outcome.degraded);
    }

    #[tokio::test]
    async fn test_unconfigured_search_yields_no_sources() {
        let mut client = MockModelClient::new();
        let model_calls = Arc::new(AtomicUsize::new(0));
        let counter = model_calls.clone();
        client.expect_generate().returning(move |_, _, _| {
            Ok(match counter.fetch_add(1, Ordering::SeqCst) {
                0 => r#"{"action":"search","query":"x"}"#.to_string(),
                _ => r#"{"action":"finish","summary":""}"#.to_string(),
            })
        });
        let mut search = MockWebSearch::new();
        search
            .expect_search()
            .returning(|_, _| Err(SearchError::NotConfigured));

        let d = dispatcher(client);
        let adapter = SearchAdapter::new(Arc::new(search), 3);
        let outcome = EvidenceLoop::new(&d, &adapter, None, 3, 3)
            .run(&prompt_ctx(), CANDIDATE)
            .await;

        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.searches, 1);
        assert!(outcome.summary.is_none());
        assert!(outcome.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_keeps_gathered_sources() {
        /// Answers the first query, then hangs.
        struct StallsAfterFirst(AtomicUsize);

        #[async_trait::async_trait]
        impl WebSearch for StallsAfterFirst {
            async fn search(
                &self,
                _query: &str,
                _count: usize,
            ) -> Result<Vec<SearchResult>, SearchError> {
                if self.0.fetch_add(1, Ordering::SeqCst) > 0 {
                    std::future::pending::<()>().await;
                }
                Ok(vec![result("https://first.org")])
            }
        }

        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .returning(|_, _, _| Ok(r#"{"action":"search","query":"more"}"#.to_string()));

        let d = dispatcher(client);
        let adapter = SearchAdapter::new(Arc::new(StallsAfterFirst(AtomicUsize::new(0))), 3);
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        let outcome = EvidenceLoop::new(&d, &adapter, None, 3, 3)
            .with_deadline(deadline)
            .run(&prompt_ctx(), CANDIDATE)
            .await;

        assert!(Instant::now() >= deadline);
        assert_eq!(outcome.sources, vec!["https://first.org"]);
        assert_eq!(outcome.searches, 2);
        assert!(outcome.degraded);
    }
}
