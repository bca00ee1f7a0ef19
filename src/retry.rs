//! Bounded exponential backoff around a single relay HTTP call.
//!
//! An idempotent call is retried on any transport error and on 5xx. A
//! non-idempotent call is retried only when no connection was made, so a
//! request the relay may have received is never sent twice.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = single attempt).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed): base * 2^attempt, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Send a request, retrying on transient failure.
///
/// `send` is invoked up to `max_retries + 1` times. The last response or
/// error is returned as-is so the caller can classify it. Logged errors are
/// stripped of their URL, which carries the access token.
pub(crate) async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    idempotent: bool,
    send: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..policy.max_retries {
        let delay = policy.delay_for_attempt(attempt);
        match send().await {
            Ok(resp) if idempotent && resp.status().is_server_error() => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "{} returned {}, retrying in {:?}",
                    what,
                    resp.status(),
                    delay
                );
            }
            Ok(resp) => return Ok(resp),
            Err(e) if idempotent || e.is_connect() => {
                let e = e.without_url();
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "{} failed, retrying in {:?}: {}",
                    what,
                    delay,
                    e
                );
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(delay).await;
    }
    send().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget_on_transport_failure() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let result = send_with_retry(&fast_policy(2), "test request", false, || {
            let cc = cc.clone();
            let client = client.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                // Port 1 is never listening: connection refused.
                client.get("http://127.0.0.1:1/").send().await
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let client = reqwest::Client::new();

        let result = send_with_retry(&fast_policy(0), "test request", false, || {
            let cc = cc.clone();
            let client = client.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                client.get("http://127.0.0.1:1/").send().await
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_retried_only_when_requested() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();

        let resp = send_with_retry(&fast_policy(2), "status", false, || {
            client.get(url.as_str()).send()
        })
        .await
        .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let resp = send_with_retry(&fast_policy(2), "status", true, || {
            client.get(url.as_str()).send()
        })
        .await
        .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_retried_only_when_idempotent() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let url = server.uri();

        // The relay saw the request, so a non-idempotent call stops here.
        let result = send_with_retry(&fast_policy(2), "submit", false, || {
            client.post(url.as_str()).send()
        })
        .await;
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let result = send_with_retry(&fast_policy(2), "status", true, || {
            client.post(url.as_str()).send()
        })
        .await;
        assert!(result.is_err());
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_retry_warning_omits_url() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = reqwest::Client::new();
        let result = send_with_retry(&fast_policy(1), "proof submission", false, || {
            client
                .post("http://127.0.0.1:1/submit-proof/SECRET-TOKEN-123")
                .send()
        })
        .await;
        assert!(result.is_err());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("proof submission failed, retrying"));
        assert!(!output.contains("SECRET-TOKEN-123"));
    }
}
