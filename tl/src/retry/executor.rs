//! Bounded retry loop around a single LLM operation

use std::future::Future;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::policy::RetryPolicy;
use crate::events::RunEmitter;
use crate::llm::{ErrorKind, LlmError};
use crate::pipeline::StageName;

/// Terminal failure of a retried operation
#[derive(Debug, Clone, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryError {
    /// The last error observed
    pub error: LlmError,
    /// Attempts actually made, including the one that produced `error`
    pub attempts: u32,
}

impl RetryError {
    pub fn new(error: LlmError, attempts: u32) -> Self {
        Self { error, attempts }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Attempts shared by every LLM call of one stage invocation
///
/// Backoff keeps growing across the calls, and a failure reports the total
/// attempts the stage made rather than those of its last call.
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    limit: u32,
    used: u32,
    retries: u32,
    last_error: Option<LlmError>,
}

impl AttemptBudget {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            used: 0,
            retries: 0,
            last_error: None,
        }
    }

    /// Attempts made so far
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Error for a call that found no attempts left
    fn exhausted(&self) -> RetryError {
        let error = self
            .last_error
            .clone()
            .unwrap_or_else(|| LlmError::Fatal("attempt budget exhausted".to_string()));
        RetryError::new(error, self.used)
    }
}

/// Executes an operation under a [`RetryPolicy`]
///
/// Retryable failures are retried after an exponential, jittered backoff until
/// the policy's budget is spent. Non-retryable failures return at once. The
/// executor also watches the run's cancellation token and deadline: either one
/// firing during an attempt or a backoff wait ends the call immediately with
/// `Cancelled` or `Timeout`.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    emitter: Option<RunEmitter>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        debug!(?policy, "RetryExecutor::new: called");
        Self {
            policy,
            emitter: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Emit a RetryAttempted event for every retry
    pub fn with_emitter(mut self, emitter: RunEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fresh budget for a stage that makes `calls` LLM calls
    ///
    /// The limit is the policy's attempt limit, raised to `calls` so every
    /// call the stage needs gets at least one attempt.
    pub fn budget(&self, calls: u32) -> AttemptBudget {
        AttemptBudget::new(self.policy.max_attempts().max(calls))
    }

    /// Run `op` until it succeeds, fails terminally, or the retry budget is spent
    pub async fn call<T, F, Fut>(&self, stage: StageName, op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut budget = self.budget(1);
        self.call_within(stage, &mut budget, op).await
    }

    /// Like [`call`](Self::call), drawing attempts from a budget shared with
    /// the stage's other calls
    ///
    /// The `RetryAttempted` event for a failed attempt is emitted before the
    /// backoff wait starts. Its `attempt` field is the 1-based count of
    /// attempts the stage has made so far, and the same count is reported in
    /// the returned [`RetryError`].
    pub async fn call_within<T, F, Fut>(
        &self,
        stage: StageName,
        budget: &mut AttemptBudget,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        debug!(%stage, used = budget.used, limit = budget.limit, "RetryExecutor::call_within: called");

        loop {
            if budget.remaining() == 0 {
                debug!(%stage, attempts = budget.used, "RetryExecutor::call_within: budget spent before attempt");
                return Err(budget.exhausted());
            }
            budget.used += 1;

            let error = match self.guarded(op()).await {
                Ok(Ok(value)) => {
                    debug!(%stage, attempts = budget.used, "RetryExecutor::call_within: succeeded");
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(interrupted) => {
                    debug!(%stage, error = %interrupted, "RetryExecutor::call_within: interrupted during attempt");
                    return Err(RetryError::new(interrupted, budget.used));
                }
            };

            if !error.is_retryable() {
                debug!(%stage, kind = %error.kind(), "RetryExecutor::call_within: not retryable");
                return Err(RetryError::new(error, budget.used));
            }
            if budget.remaining() == 0 {
                debug!(%stage, attempts = budget.used, "RetryExecutor::call_within: retries exhausted");
                return Err(RetryError::new(error, budget.used));
            }

            let delay = {
                let mut rng = rand::rng();
                self.policy.delay_for(budget.retries, &mut rng)
            };
            warn!(
                %stage,
                attempt = budget.used,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                "LLM call failed, retrying: {}",
                error
            );
            if let Some(emitter) = &self.emitter {
                emitter.retry_attempted(stage, budget.used, delay, error.kind(), &error.to_string());
            }
            budget.last_error = Some(error);

            if let Err(interrupted) = self.guarded(tokio::time::sleep(delay)).await {
                debug!(%stage, error = %interrupted, "RetryExecutor::call_within: interrupted during backoff");
                return Err(RetryError::new(interrupted, budget.used));
            }
            budget.retries += 1;
        }
    }

    /// Race `fut` against cancellation and the run deadline
    async fn guarded<O>(&self, fut: impl Future<Output = O>) -> Result<O, LlmError> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(LlmError::Cancelled),
            _ = deadline => Err(LlmError::Timeout("run deadline exceeded".to_string())),
            out = fut => Ok(out),
        }
    }
}
