//! Object storage upload with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::StoreError;
use crate::error::AgentError;

/// Default number of upload attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base backoff delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2_000;
/// Default per-attempt timeout in seconds.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// Destination for exported artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`. Returns the object URL when the storage
    /// API reports one.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Option<String>, StoreError>;

    /// URL to use when `put` does not return one.
    fn public_url(&self, key: &str) -> String;
}

/// Retry policy for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Total attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        }
    }
}

impl UploadPolicy {
    /// Backoff after failed attempt number `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Longest time `Uploader::upload` can take: every attempt timing out
    /// plus every backoff between them.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff = (1..attempts)
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add);
        self.attempt_timeout.saturating_mul(attempts).saturating_add(backoff)
    }
}

/// Outcome of one upload attempt.
#[derive(Debug)]
enum UploadAttempt {
    Uploaded(String),
    Retryable(String),
}

/// Uploads artifacts to an [`ObjectStore`] under an [`UploadPolicy`].
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    policy: UploadPolicy,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Creates an uploader.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, policy: UploadPolicy) -> Self {
        Self { store, policy }
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Uploads `bytes` under `key`, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UploadFailure`] once every attempt has failed.
    /// The message lists each attempt's error.
    pub async fn upload(
        &self,
        bytes: &[u8],
        key: &str,
        content_type: &str,
    ) -> Result<String, AgentError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut failures = Vec::new();

        for attempt in 1..=max_attempts {
            match self.attempt(bytes, key, content_type).await {
                UploadAttempt::Uploaded(url) => {
                    info!(key, attempt, bytes = bytes.len(), "export uploaded");
                    return Ok(url);
                }
                UploadAttempt::Retryable(error) => {
                    warn!(key, attempt, max_attempts, %error, "upload attempt failed");
                    failures.push(format!("attempt {attempt}: {error}"));
                    if attempt < max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        debug!(delay_ms = delay.as_millis(), "backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AgentError::UploadFailure {
            attempts: max_attempts,
            message: failures.join("; "),
        })
    }

    async fn attempt(&self, bytes: &[u8], key: &str, content_type: &str) -> UploadAttempt {
        let put = self.store.put(key, bytes, content_type);
        match tokio::time::timeout(self.policy.attempt_timeout, put).await {
            Ok(Ok(url)) => UploadAttempt::Uploaded(url.unwrap_or_else(|| self.store.public_url(key))),
            Ok(Err(e)) => UploadAttempt::Retryable(e.to_string()),
            Err(_) => UploadAttempt::Retryable(format!(
                "timed out after {}s",
                self.policy.attempt_timeout.as_secs()
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    struct FlakyStore {
        failures_before_success: u32,
        calls: AtomicU32,
        returns_url: bool,
    }

    impl FlakyStore {
        fn new(failures_before_success: u32) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
                returns_url: false,
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(
            &self,
            key: &str,
            _bytes: &[u8],
            _content_type: &str,
        ) -> Result<Option<String>, StoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures_before_success {
                return Err(StoreError::Request(format!("503 on call {n}")));
            }
            Ok(self.returns_url.then(|| format!("https://cdn.test/{key}")))
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://bucket.s3.us-east-1.amazonaws.com/{key}")
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_worst_case_covers_every_attempt() {
        assert_eq!(UploadPolicy::default().worst_case(), Duration::from_secs(186));
        let single = UploadPolicy {
            max_attempts: 0,
            ..UploadPolicy::default()
        };
        assert_eq!(single.worst_case(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fail_succeed_uses_three_attempts() {
        let store = Arc::new(FlakyStore::new(2));
        let uploader = Uploader::new(store.clone(), UploadPolicy::default());
        let started = Instant::now();

        let url = uploader
            .upload(b"xlsx", "shop/reports/a.xlsx", "application/octet-stream")
            .await
            .unwrap_or_else(|e| panic!("upload failed: {e}"));

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(url, "https://bucket.s3.us-east-1.amazonaws.com/shop/reports/a.xlsx");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6), "{waited:?}");
        assert!(waited < Duration::from_secs(7), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_reports_every_attempt() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let uploader = Uploader::new(store.clone(), UploadPolicy::default());

        let err = uploader
            .upload(b"xlsx", "k", "application/octet-stream")
            .await
            .err()
            .unwrap_or_else(|| panic!("expected failure"));

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        match err {
            AgentError::UploadFailure { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("attempt 1"));
                assert!(message.contains("attempt 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_url_wins_over_public_url() {
        let store = Arc::new(FlakyStore {
            returns_url: true,
            ..FlakyStore::new(0)
        });
        let uploader = Uploader::new(store, UploadPolicy::default());
        let url = uploader
            .upload(b"x", "k.xlsx", "application/octet-stream")
            .await
            .unwrap_or_else(|e| panic!("upload failed: {e}"));
        assert_eq!(url, "https://cdn.test/k.xlsx");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_retries() {
        struct SlowOnce(AtomicU32);

        #[async_trait]
        impl ObjectStore for SlowOnce {
            async fn put(&self, _: &str, _: &[u8], _: &str) -> Result<Option<String>, StoreError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                }
                Ok(None)
            }

            fn public_url(&self, key: &str) -> String {
                key.to_string()
            }
        }

        let store = Arc::new(SlowOnce(AtomicU32::new(0)));
        let policy = UploadPolicy {
            attempt_timeout: Duration::from_secs(5),
            ..UploadPolicy::default()
        };
        let url = Uploader::new(store.clone(), policy)
            .upload(b"x", "k", "t")
            .await
            .unwrap_or_else(|e| panic!("upload failed: {e}"));
        assert_eq!(url, "k");
        assert_eq!(store.0.load(Ordering::SeqCst), 2);
    }
}
