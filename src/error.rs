use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// Stage of the verify pipeline an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Produce,
    Build,
    Submit,
    Poll,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validate => "validate",
            Phase::Produce => "produce",
            Phase::Build => "build",
            Phase::Submit => "submit",
            Phase::Poll => "poll",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can go wrong between caller input and a finalized receipt.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Caller input or a proof artifact is structurally invalid.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The external proving toolchain did not produce a proof.
    #[error("artifact production failed: {message}")]
    ArtifactProduction {
        message: String,
        diagnostics: Option<String>,
    },

    /// The relay rejected the submission or could not be reached.
    #[error("proof submission failed: {message}")]
    Submission {
        message: String,
        status: Option<u16>,
        body: Option<Value>,
    },

    /// A status query kept failing after its retry budget was spent.
    #[error("status query for job {job_id} failed: {message}")]
    StatusQuery {
        job_id: String,
        message: String,
        status: Option<u16>,
        body: Option<Value>,
    },

    /// The relay answered with something the client cannot interpret.
    #[error("relay protocol violation: {0}")]
    Protocol(String),

    /// The relay reported the job as failed.
    #[error("job {job_id} failed with status {status}: {reason}")]
    JobFailed {
        job_id: String,
        status: String,
        reason: String,
        body: Value,
    },

    /// The job was still pending when the poll budget ran out.
    #[error("job {job_id} not finalized after {attempts} status checks ({elapsed:?})")]
    PollTimeout {
        job_id: String,
        attempts: u32,
        elapsed: Duration,
        last_status: Option<String>,
    },

    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl RelayError {
    /// Error payload the upstream service returned, if any.
    pub fn upstream_body(&self) -> Option<&Value> {
        match self {
            RelayError::Submission { body, .. } | RelayError::StatusQuery { body, .. } => {
                body.as_ref()
            }
            RelayError::JobFailed { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Toolchain output attached to an artifact production failure.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            RelayError::ArtifactProduction { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

/// A [`RelayError`] tagged with the pipeline phase it came from.
#[derive(Debug, thiserror::Error)]
#[error("{phase} phase: {source}")]
pub struct PipelineError {
    pub phase: Phase,
    #[source]
    pub source: RelayError,
}

impl PipelineError {
    pub fn new(phase: Phase, source: RelayError) -> Self {
        Self { phase, source }
    }
}
