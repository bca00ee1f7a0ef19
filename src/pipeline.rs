//! Caller input → proof artifacts → submission → finalized receipt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Phase, PipelineError, RelayError};
use crate::proof::SubmissionProfile;
use crate::prover::ArtifactProducer;
use crate::relay::RelayClient;
use crate::types::VerifyResponse;

/// Runs one verification end to end.
///
/// All per-job state lives on the stack of `verify`, so a single pipeline
/// serves any number of concurrent requests. Dropping the `verify` future
/// stops polling and kills any running toolchain command.
#[derive(Clone)]
pub struct Pipeline {
    producer: Arc<dyn ArtifactProducer>,
    profile: SubmissionProfile,
    relay: RelayClient,
}

impl Pipeline {
    pub fn new(
        producer: Arc<dyn ArtifactProducer>,
        profile: SubmissionProfile,
        relay: RelayClient,
    ) -> Self {
        Self {
            producer,
            profile,
            relay,
        }
    }

    pub fn profile(&self) -> &SubmissionProfile {
        &self.profile
    }

    pub async fn verify(
        &self,
        data_hash: &str,
        timestamp: &str,
        deadline: Duration,
    ) -> Result<VerifyResponse, PipelineError> {
        if data_hash.trim().is_empty() || timestamp.trim().is_empty() {
            return Err(PipelineError::new(
                Phase::Validate,
                RelayError::MalformedInput("Missing dataHash or timestamp".to_string()),
            ));
        }

        let expires = Instant::now() + deadline;

        let triple = within(
            Phase::Produce,
            expires,
            deadline,
            self.producer.produce(data_hash, timestamp),
        )
        .await?;

        let request = self
            .profile
            .build(triple)
            .map_err(|e| PipelineError::new(Phase::Build, e))?;

        let handle = within(Phase::Submit, expires, deadline, self.relay.submit(&request)).await?;
        let job = within(Phase::Poll, expires, deadline, self.relay.poll(&handle.job_id)).await?;

        Ok(VerifyResponse {
            commitment: request.commitment().to_string(),
            job_id: job.id,
            receipt: job.receipt,
        })
    }
}

/// Run one phase against the request-wide deadline.
async fn within<T, F>(
    phase: Phase,
    expires: Instant,
    deadline: Duration,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, RelayError>>,
{
    match tokio::time::timeout_at(expires, fut).await {
        Ok(result) => result.map_err(|e| PipelineError::new(phase, e)),
        Err(_) => {
            tracing::warn!("Request deadline of {:?} hit during {} phase", deadline, phase);
            Err(PipelineError::new(
                phase,
                RelayError::DeadlineExceeded(deadline),
            ))
        }
    }
}
