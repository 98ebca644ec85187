//! Concurrency-limited LLM client
//!
//! Several pipeline runs may share one rate-limited endpoint. Wrapping the
//! client in a [`LimitedClient`] caps the number of calls in flight at once,
//! independent of how many runs are active.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{GenerationOptions, LlmClient, LlmError};

/// LlmClient decorator bounding concurrent in-flight calls
pub struct LimitedClient {
    inner: Arc<dyn LlmClient>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl LimitedClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        debug!(max_concurrent, model = inner.model(), "LimitedClient::new: called");
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Number of calls that could start right now without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[async_trait]
impl LlmClient for LimitedClient {
    async fn invoke(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError> {
        debug!(available = self.available(), "LimitedClient::invoke: acquiring permit");
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Fatal("concurrency limiter closed".to_string()))?;
        self.inner.invoke(prompt, options).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Client that records the peak number of overlapping calls
    struct SlowClient {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn invoke(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_limits_concurrent_calls() {
        let slow = Arc::new(SlowClient {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let limited = Arc::new(LimitedClient::new(slow.clone(), 2));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let client = limited.clone();
            handles.push(tokio::spawn(async move {
                client.invoke("p", &GenerationOptions::default()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "ok");
        }

        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limited.available(), 2);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let slow = Arc::new(SlowClient {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let limited = LimitedClient::new(slow, 0);
        assert_eq!(limited.max_concurrent(), 1);
        assert_eq!(limited.model(), "slow");
    }
}
