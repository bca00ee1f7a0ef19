//! Client for the proof verification relay.
//!
//! One job's lifecycle is `submit` → `poll` until a terminal status. The
//! client holds no per-job state: every call carries its own job id, so a
//! single `RelayClient` can be cloned freely across concurrent requests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::proof::SubmissionRequest;
use crate::retry::{send_with_retry, RetryPolicy};

// ─────────────────────────────────────────────
// Credentials and policies
// ─────────────────────────────────────────────

/// Pre-issued relay access token. Embedded in request paths, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Bounds on the status poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_duration: Duration,
    /// Optional cap on status checks, on top of `max_duration`.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_duration: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

/// Status values the relay reports, split by meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    pub finalized: String,
    pub pending: Vec<String>,
    pub failed: Vec<String>,
}

impl Default for StatusSet {
    fn default() -> Self {
        Self {
            finalized: "Finalized".to_string(),
            pending: ["Pending", "Queued", "Valid", "Submitted", "IncludedInBlock"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            failed: vec!["Failed".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending(String),
    Finalized,
    Failed(String),
    /// A value the client does not recognize.
    Unknown(String),
}

impl StatusSet {
    pub fn classify(&self, status: &str) -> JobStatus {
        if status == self.finalized {
            JobStatus::Finalized
        } else if self.failed.iter().any(|s| s == status) {
            JobStatus::Failed(status.to_string())
        } else if self.pending.iter().any(|s| s == status) {
            JobStatus::Pending(status.to_string())
        } else {
            JobStatus::Unknown(status.to_string())
        }
    }
}

// ─────────────────────────────────────────────
// Job types
// ─────────────────────────────────────────────

/// Handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

/// A job that reached `Finalized`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: String,
    /// The full finalized status payload.
    pub receipt: Value,
    pub status_checks: u32,
}

// ─────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────

#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
    token: AccessToken,
    poll: PollPolicy,
    submit_retry: RetryPolicy,
    status_retry: RetryPolicy,
    statuses: Arc<StatusSet>,
}

/// Everything needed to construct a [`RelayClient`].
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub base_url: String,
    pub access_token: AccessToken,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub submit_retry: RetryPolicy,
    pub status_retry: RetryPolicy,
    pub statuses: StatusSet,
}

impl RelaySettings {
    /// Settings with default policies against the given relay.
    pub fn new(base_url: impl Into<String>, access_token: AccessToken) -> Self {
        Self {
            base_url: base_url.into(),
            access_token,
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
            submit_retry: RetryPolicy {
                max_retries: 2,
                ..RetryPolicy::default()
            },
            status_retry: RetryPolicy::default(),
            statuses: StatusSet::default(),
        }
    }
}

impl RelayClient {
    pub fn new(settings: RelaySettings) -> Result<Self, RelayError> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            RelayError::MalformedInput(format!(
                "invalid relay base URL '{}': {}",
                settings.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::MalformedInput(format!(
                "relay base URL '{}' cannot carry path segments",
                settings.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| RelayError::MalformedInput(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            token: settings.access_token,
            poll: settings.poll,
            submit_retry: settings.submit_retry,
            status_retry: settings.status_retry,
            statuses: Arc::new(settings.statuses),
        })
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Submit a built request and return the relay's job handle.
    pub async fn submit(&self, request: &SubmissionRequest) -> Result<JobHandle, RelayError> {
        let url = self.endpoint(&["submit-proof", self.token.expose()]);

        tracing::info!(
            "Submitting {} proof (commitment={})",
            request.proof_type(),
            request.commitment()
        );

        let resp = send_with_retry(&self.submit_retry, "proof submission", false, || {
            self.http.post(url.clone()).json(request).send()
        })
        .await
        .map_err(|e| RelayError::Submission {
            message: format!("relay unreachable: {}", e.without_url()),
            status: None,
            body: None,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = read_error_body(resp).await;
            tracing::error!("Relay rejected submission: HTTP {}", status);
            return Err(RelayError::Submission {
                message: format!("relay returned HTTP {}", status),
                status: Some(status.as_u16()),
                body,
            });
        }

        let body: Value = resp.json().await.map_err(|e| {
            RelayError::Protocol(format!(
                "submission response is not JSON: {}",
                e.without_url()
            ))
        })?;

        let job_id = match body.get("jobId").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(RelayError::Protocol(format!(
                    "submission accepted but no jobId returned: {}",
                    body
                )))
            }
        };

        tracing::info!("Proof submitted: jobId={}", job_id);
        Ok(JobHandle { job_id })
    }

    /// Poll a job until it is finalized, fails, or the poll budget runs out.
    pub async fn poll(&self, job_id: &str) -> Result<Job, RelayError> {
        let started = Instant::now();
        let deadline = started + self.poll.max_duration;
        let mut attempts: u32 = 0;
        let mut last_status = None;

        let timed_out = |attempts: u32, last_status: Option<String>| RelayError::PollTimeout {
            job_id: job_id.to_string(),
            attempts,
            elapsed: started.elapsed(),
            last_status,
        };

        loop {
            attempts += 1;
            let body = match tokio::time::timeout_at(deadline, self.query_status(job_id)).await {
                Ok(result) => result?,
                Err(_) => return Err(timed_out(attempts, last_status)),
            };

            let status = match body.get("status").and_then(Value::as_str) {
                Some(s) => s.to_string(),
                None => {
                    return Err(RelayError::Protocol(format!(
                        "status response for job {} has no status field: {}",
                        job_id, body
                    )))
                }
            };
            tracing::info!("Job {} status: {} (check {})", job_id, status, attempts);

            match self.statuses.classify(&status) {
                JobStatus::Finalized => {
                    tracing::info!("Job {} finalized after {} checks", job_id, attempts);
                    return Ok(Job {
                        id: job_id.to_string(),
                        status,
                        receipt: body,
                        status_checks: attempts,
                    });
                }
                JobStatus::Failed(status) => {
                    let reason = failure_reason(&body).unwrap_or_else(|| status.clone());
                    tracing::error!("Job {} failed: {} ({})", job_id, status, reason);
                    return Err(RelayError::JobFailed {
                        job_id: job_id.to_string(),
                        status,
                        reason,
                        body,
                    });
                }
                JobStatus::Unknown(status) => {
                    return Err(RelayError::Protocol(format!(
                        "job {} reported unrecognized status '{}'",
                        job_id, status
                    )));
                }
                JobStatus::Pending(status) => last_status = Some(status),
            }

            if self.poll.max_attempts.is_some_and(|max| attempts >= max)
                || Instant::now() + self.poll.interval >= deadline
            {
                return Err(timed_out(attempts, last_status));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Submit then poll. A failed poll never triggers a resubmission.
    pub async fn run_job(&self, request: &SubmissionRequest) -> Result<Job, RelayError> {
        let handle = self.submit(request).await?;
        self.poll(&handle.job_id).await
    }

    async fn query_status(&self, job_id: &str) -> Result<Value, RelayError> {
        let url = self.endpoint(&["job-status", self.token.expose(), job_id]);

        let resp = send_with_retry(&self.status_retry, "job status query", true, || {
            self.http.get(url.clone()).send()
        })
        .await
        .map_err(|e| RelayError::StatusQuery {
            job_id: job_id.to_string(),
            message: format!("relay unreachable: {}", e.without_url()),
            status: None,
            body: None,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = read_error_body(resp).await;
            return Err(RelayError::StatusQuery {
                job_id: job_id.to_string(),
                message: format!("relay returned HTTP {}", status),
                status: Some(status.as_u16()),
                body,
            });
        }

        resp.json().await.map_err(|e| {
            RelayError::Protocol(format!(
                "status response for job {} is not JSON: {}",
                job_id,
                e.without_url()
            ))
        })
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

async fn read_error_body(resp: reqwest::Response) -> Option<Value> {
    let text = resp.text().await.ok()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn failure_reason(body: &Value) -> Option<String> {
    ["error", "message", "reason"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

impl fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.base_url.as_str())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}
