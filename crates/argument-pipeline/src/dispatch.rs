//! Model dispatch: rotation, bounded concurrency, timeouts and retries.
//!
//! Every model call in the pipeline goes through [`Dispatcher`]. One call:
//!
//! 1. picks a model (`next_model()`, or a pinned role model);
//! 2. waits for a [`CallLimiter`] slot;
//! 3. runs `generate` under the model's timeout;
//! 4. parses the output with the stage's parser.
//!
//! Transport failures and timeouts mark the model unhealthy and move on to
//! the next rotated model; malformed output is retried once. Exhausting
//! either bound returns the last error. `PoolExhausted` is never retried.
//!
//! A call scoped to a stage deadline shares the time left between the
//! attempts it may still make, so a timed-out model is retried inside the
//! stage. The last attempt keeps the model's full timeout and is bounded by
//! the stage timeout instead.

use std::sync::Arc;
use std::time::Duration;

use debate_coordination::config::{ModelConfigTable, PipelineConfig, RetryPolicy};
use debate_coordination::limiter::CallLimiter;
use debate_coordination::registry::ModelRegistry;
use debate_coordination::types::StageName;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{ModelCallError, PipelineError, RetryCategory};
use crate::parse::ParseError;
use crate::providers::{GenerateOptions, ModelClient};

/// A parsed model response and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<T> {
    pub value: T,
    pub model: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// The stage a call serves and, when known, the deadline of that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallScope {
    pub stage: StageName,
    pub deadline: Option<Instant>,
}

impl CallScope {
    pub fn within(stage: StageName, deadline: Instant) -> Self {
        Self {
            stage,
            deadline: Some(deadline),
        }
    }
}

impl From<StageName> for CallScope {
    fn from(stage: StageName) -> Self {
        Self {
            stage,
            deadline: None,
        }
    }
}

/// Timeout for one attempt when `attempts_left` attempts remain.
fn attempt_timeout(model_timeout: Duration, deadline: Option<Instant>, attempts_left: u32) -> Duration {
    let Some(deadline) = deadline else {
        return model_timeout;
    };
    if attempts_left <= 1 {
        return model_timeout;
    }
    let share = deadline.saturating_duration_since(Instant::now()) / attempts_left;
    if share.is_zero() {
        model_timeout
    } else {
        model_timeout.min(share)
    }
}

pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    client: Arc<dyn ModelClient>,
    limiter: CallLimiter,
    models: ModelConfigTable,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        client: Arc<dyn ModelClient>,
        limiter: CallLimiter,
        models: ModelConfigTable,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            client,
            limiter,
            models,
            retry,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        registry: Arc<ModelRegistry>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self::new(
            registry,
            client,
            CallLimiter::new(config.limits.max_concurrent_calls),
            config.models.clone(),
            config.retry.clone(),
        )
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &CallLimiter {
        &self.limiter
    }

    /// Call the next rotated model.
    pub async fn call<T, F>(
        &self,
        scope: impl Into<CallScope>,
        prompt: &str,
        parse: F,
    ) -> Result<Dispatched<T>, PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        self.call_with_retries(None, scope.into(), prompt, &parse)
            .await
    }

    /// Call a named model with the same retry bounds but no rotation.
    pub async fn call_model<T, F>(
        &self,
        model: &str,
        scope: impl Into<CallScope>,
        prompt: &str,
        parse: F,
    ) -> Result<Dispatched<T>, PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        self.call_with_retries(Some(model), scope.into(), prompt, &parse)
            .await
    }

    /// `call_model` when a role model is configured, `call` otherwise.
    pub async fn call_role<T, F>(
        &self,
        role_model: Option<&str>,
        scope: impl Into<CallScope>,
        prompt: &str,
        parse: F,
    ) -> Result<Dispatched<T>, PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        self.call_with_retries(role_model, scope.into(), prompt, &parse)
            .await
    }

    async fn call_with_retries<T, F>(
        &self,
        pinned: Option<&str>,
        scope: CallScope,
        prompt: &str,
        parse: &F,
    ) -> Result<Dispatched<T>, PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let stage = scope.stage;
        let mut transient_failures = 0u32;
        let mut malformed_failures = 0u32;
        let mut attempts = 0u32;

        loop {
            let model = match pinned {
                Some(name) => name.to_string(),
                None => self.registry.next_model()?,
            };
            attempts += 1;

            let attempts_left = self.retry.max_transient_retries.saturating_sub(transient_failures) + 1;
            let err = match self
                .attempt(&model, stage, scope.deadline, attempts_left, prompt, parse)
                .await
            {
                Ok(value) => {
                    return Ok(Dispatched {
                        value,
                        model,
                        attempts,
                    })
                }
                Err(err) => err,
            };

            match err.retry_category() {
                RetryCategory::Transient => {
                    self.report_health(&model, false);
                    transient_failures += 1;
                    if transient_failures > self.retry.max_transient_retries {
                        warn!(stage = %stage, model = %model, attempts, error = %err, "Transient retries exhausted");
                        return Err(err);
                    }
                    warn!(stage = %stage, model = %model, attempt = attempts, error = %err, "Model call failed, retrying");
                }
                RetryCategory::ParseFailure => {
                    malformed_failures += 1;
                    if malformed_failures > self.retry.max_malformed_retries {
                        warn!(stage = %stage, model = %model, attempts, error = %err, "Malformed output retries exhausted");
                        return Err(err);
                    }
                    warn!(stage = %stage, model = %model, attempt = attempts, error = %err, "Malformed model output, retrying");
                }
                RetryCategory::Fatal | RetryCategory::Cancelled => return Err(err),
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        model: &str,
        stage: StageName,
        deadline: Option<Instant>,
        attempts_left: u32,
        prompt: &str,
        parse: &F,
    ) -> Result<T, PipelineError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let config = self.models.get(model);

        let raw = {
            let _permit = self.limiter.acquire().await;
            let options = GenerateOptions {
                timeout: attempt_timeout(config.timeout(), deadline, attempts_left),
                max_tokens: config.max_tokens,
            };
            let started = Instant::now();
            let outcome = tokio::time::timeout(
                options.timeout,
                self.client.generate(model, prompt, options),
            )
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(raw)) => {
                    debug!(stage = %stage, model, elapsed_ms, "Model call succeeded");
                    self.report_health(model, true);
                    if self.registry.contains(model) {
                        self.registry.record_latency(model, elapsed_ms);
                    }
                    raw
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(ModelCallError::Timeout {
                        model: model.to_string(),
                        timeout_ms: options.timeout.as_millis() as u64,
                    }
                    .into())
                }
            }
        };

        parse(&raw).map_err(|e| PipelineError::malformed(model, e.0))
    }

    /// Role models outside the pool are not tracked.
    fn report_health(&self, model: &str, ok: bool) {
        if self.registry.contains(model) {
            self.registry.report_health(model, ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use debate_coordination::config::ModelConfig;

    use super::*;
    use crate::providers::MockModelClient;

    fn dispatcher(pool: &[&str], client: MockModelClient) -> Dispatcher {
        Dispatcher::new(
            ModelRegistry::shared(pool.iter().copied()),
            Arc::new(client),
            CallLimiter::new(2),
            ModelConfigTable::default(),
            RetryPolicy::default(),
        )
    }

    fn echo(raw: &str) -> Result<String, ParseError> {
        if raw.starts_with("ok") {
            Ok(raw.to_string())
        } else {
            Err(ParseError("not ok".into()))
        }
    }

    #[tokio::test]
    async fn test_success_uses_rotation_and_marks_healthy() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .times(2)
            .returning(|model, _, _| Ok(format!("ok from {model}")));
        let d = dispatcher(&["m1", "m2", "m3"], client);

        let first = d.call(StageName::DiverseGeneration, "p", echo).await.unwrap();
        let second = d.call(StageName::DiverseGeneration, "p", echo).await.unwrap();
        assert_eq!(first.model, "m1");
        assert_eq!(second.model, "m2");
        assert_eq!(first.value, "ok from m1");
        assert_eq!(first.attempts, 1);
        assert_eq!(d.registry().health("m1").unwrap().success_count, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_rotates_and_marks_unhealthy() {
        let mut client = MockModelClient::new();
        client.expect_generate().returning(|model, _, _| {
            if model == "m1" {
                Err(ModelCallError::Transport {
                    model: model.to_string(),
                    message: "connection refused".into(),
                })
            } else {
                Ok("ok".into())
            }
        });
        let d = dispatcher(&["m1", "m2"], client);

        let result = d.call(StageName::Tournament, "p", echo).await.unwrap();
        assert_eq!(result.model, "m2");
        assert_eq!(result.attempts, 2);
        assert!(!d.registry().health("m1").unwrap().healthy);
        assert_eq!(d.registry().healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_retries_are_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |model, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ModelCallError::Transport {
                model: model.to_string(),
                message: "503".into(),
            })
        });
        let d = dispatcher(&["m1", "m2", "m3", "m4", "m5"], client);

        let err = d.call(StageName::Tournament, "p", echo).await.unwrap_err();
        assert!(matches!(err, PipelineError::ModelCall(_)));
        // One attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(d.registry().healthy_count(), 2);
    }

    #[tokio::test]
    async fn test_pool_exhausted_mid_retry_is_fatal() {
        let mut client = MockModelClient::new();
        client.expect_generate().returning(|model, _, _| {
            Err(ModelCallError::Transport {
                model: model.to_string(),
                message: "down".into(),
            })
        });
        let d = dispatcher(&["only"], client);

        let err = d.call(StageName::Tournament, "p", echo).await.unwrap_err();
        assert!(matches!(err, PipelineError::PoolExhausted { pool_size: 1 }));
    }

    #[tokio::test]
    async fn test_no_call_when_pool_exhausted() {
        let mut client = MockModelClient::new();
        client.expect_generate().never();
        let d = dispatcher(&["m1", "m2"], client);
        d.registry().report_health("m1", false);
        d.registry().report_health("m2", false);

        let err = d.call(StageName::StrategySelection, "p", echo).await.unwrap_err();
        assert!(matches!(err, PipelineError::PoolExhausted { pool_size: 2 }));
    }

    #[tokio::test]
    async fn test_malformed_output_retried_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("garbage".into())
        });
        let d = dispatcher(&["m1", "m2", "m3"], client);

        let err = d.call(StageName::FinalRefinement, "p", echo).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedModelOutput { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // A parse failure says nothing about model health.
        assert_eq!(d.registry().healthy_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_then_valid_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut client = MockModelClient::new();
        client.expect_generate().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("garbage".into())
            } else {
                Ok("ok now".into())
            }
        });
        let d = dispatcher(&["m1", "m2"], client);

        let result = d.call(StageName::DiverseGeneration, "p", echo).await.unwrap();
        assert_eq!(result.value, "ok now");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_call_model_pins_name_without_rotation() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .withf(|model, _, _| model == "claude-haiku-3.5")
            .times(1)
            .returning(|_, _, _| Ok("ok".into()));
        let d = dispatcher(&["m1", "m2"], client);

        let result = d
            .call_model("claude-haiku-3.5", StageName::FinalRefinement, "p", echo)
            .await
            .unwrap();
        assert_eq!(result.model, "claude-haiku-3.5");
        // Rotation untouched: next rotated call still starts at m1.
        assert_eq!(d.registry().next_model().unwrap(), "m1");
    }

    #[tokio::test]
    async fn test_options_come_from_model_table() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .withf(|_, _, options| {
                options.timeout == Duration::from_secs(45) && options.max_tokens == 1000
            })
            .times(1)
            .returning(|_, _, _| Ok("ok".into()));
        let d = dispatcher(&["nemotron-nano:latest"], client);

        d.call(StageName::Tournament, "p", echo).await.unwrap();
        assert_eq!(
            ModelConfigTable::default().get("nemotron-nano:latest"),
            ModelConfig::new(45_000, 1000)
        );
    }

    /// `slow` never answers in time; every other model answers at once.
    struct Slow;

    #[async_trait::async_trait]
    impl ModelClient for Slow {
        async fn generate(
            &self,
            model: &str,
            _prompt: &str,
            _options: GenerateOptions,
        ) -> Result<String, ModelCallError> {
            if model == "slow" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok("ok".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_is_transient() {
        let d = Dispatcher::new(
            ModelRegistry::shared(["slow", "fast"]),
            Arc::new(Slow),
            CallLimiter::new(1),
            ModelConfigTable::default(),
            RetryPolicy::default(),
        );
        let result = d.call(StageName::Tournament, "p", echo).await.unwrap();
        assert_eq!(result.model, "fast");
        assert!(!d.registry().health("slow").unwrap().healthy);
        assert_eq!(d.limiter().active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_model_retried_inside_stage() {
        let d = Dispatcher::new(
            ModelRegistry::shared(["slow", "fast"]),
            Arc::new(Slow),
            CallLimiter::new(1),
            ModelConfigTable::default(),
            RetryPolicy::default(),
        );
        let started = Instant::now();
        // the model's own timeout would use up the whole stage
        let deadline = started + Duration::from_secs(60);

        let result = d
            .call(CallScope::within(StageName::EnsembleConsensus, deadline), "p", echo)
            .await
            .unwrap();

        assert_eq!(result.model, "fast");
        assert_eq!(result.attempts, 2);
        assert!(Instant::now() < deadline);
        assert!(started.elapsed() <= Duration::from_secs(21));
        assert!(!d.registry().health("slow").unwrap().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_shares_remaining_budget() {
        let model = Duration::from_secs(60);
        let deadline = Instant::now() + Duration::from_secs(30);

        assert_eq!(attempt_timeout(model, None, 3), model);
        assert_eq!(attempt_timeout(model, Some(deadline), 3), Duration::from_secs(10));
        assert_eq!(
            attempt_timeout(Duration::from_secs(5), Some(deadline), 3),
            Duration::from_secs(5)
        );
        // the last attempt is bounded by the stage, not shortened here
        assert_eq!(attempt_timeout(model, Some(deadline), 1), model);
        assert_eq!(attempt_timeout(model, Some(Instant::now()), 3), model);
    }
}
