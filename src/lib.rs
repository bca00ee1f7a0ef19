//! zkStream relay
//!
//! Proves a data commitment with the circom/snarkjs Groth16 toolchain,
//! submits the proof to a verification relay and waits for the job to be
//! finalized on chain.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proof;
pub mod prover;
pub mod relay;
pub mod retry;
pub mod routes;
pub mod types;

pub use config::{Config, ConfigError, Mode};
pub use error::{Phase, PipelineError, RelayError};
pub use pipeline::Pipeline;
pub use proof::{ProofTriple, SubmissionProfile, SubmissionRequest};
pub use prover::{ArtifactProducer, ProverConfig, SnarkjsProducer};
pub use relay::{AccessToken, Job, JobHandle, JobStatus, PollPolicy, RelayClient, RelaySettings};
pub use routes::{build_router, AppState};
pub use types::VerifyResponse;
