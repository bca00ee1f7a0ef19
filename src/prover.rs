use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::artifacts::{load_triple, ArtifactPaths};
use crate::error::RelayError;
use crate::proof::ProofTriple;

/// Produces a proof for a data commitment at a timestamp.
///
/// The core never looks inside the proving toolchain; tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    async fn produce(&self, commitment: &str, timestamp: &str) -> Result<ProofTriple, RelayError>;
}

// ─────────────────────────────────────────────
// snarkjs toolchain
// ─────────────────────────────────────────────

/// Paths and binaries for the circom/snarkjs Groth16 toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProverConfig {
    pub node_path: String,
    pub snarkjs_path: String,
    pub witness_generator: PathBuf,
    pub circuit_wasm: PathBuf,
    pub proving_key: PathBuf,
    pub verification_key: PathBuf,
    /// Upper bound for each toolchain command.
    pub command_timeout: Duration,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            node_path: "node".to_string(),
            snarkjs_path: "snarkjs".to_string(),
            witness_generator: PathBuf::from("build/streamproof_js/generate_witness.js"),
            circuit_wasm: PathBuf::from("build/streamproof_js/streamproof.wasm"),
            proving_key: PathBuf::from("build/streamproof_final.zkey"),
            verification_key: PathBuf::from("data/verification_key.json"),
            command_timeout: Duration::from_secs(120),
        }
    }
}

/// Runs witness generation and `snarkjs groth16 prove` for each request.
///
/// Every call works in its own temp directory, so concurrent requests never
/// overwrite each other's `input.json` or proof files. The directory is
/// removed when the call finishes or is cancelled.
pub struct SnarkjsProducer {
    config: ProverConfig,
}

impl SnarkjsProducer {
    pub fn new(config: ProverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ArtifactProducer for SnarkjsProducer {
    async fn produce(&self, commitment: &str, timestamp: &str) -> Result<ProofTriple, RelayError> {
        let work_dir = tempfile::Builder::new()
            .prefix("zkstream-")
            .tempdir()
            .map_err(|e| production_error(format!("Failed to create work dir: {}", e)))?;
        let dir = work_dir.path();

        tracing::info!("Generating proof for commitment={} workDir={}", commitment, dir.display());

        let input_path = dir.join("input.json");
        let input = serde_json::json!({ "dataHash": commitment, "timestamp": timestamp });
        tokio::fs::write(&input_path, input.to_string())
            .await
            .map_err(|e| production_error(format!("Failed to write input.json: {}", e)))?;

        // Step 1: witness
        let witness_path = dir.join("witness.wtns");
        run_command_with_timeout(
            &self.config.node_path,
            [
                self.config.witness_generator.as_os_str(),
                self.config.circuit_wasm.as_os_str(),
                input_path.as_os_str(),
                witness_path.as_os_str(),
            ],
            self.config.command_timeout,
        )
        .await?;

        // Step 2: groth16 proof
        let paths = ArtifactPaths {
            proof: dir.join("proof.json"),
            public_signals: dir.join("public.json"),
            verification_key: self.config.verification_key.clone(),
        };
        run_command_with_timeout(
            &self.config.snarkjs_path,
            [
                OsStr::new("groth16"),
                OsStr::new("prove"),
                self.config.proving_key.as_os_str(),
                witness_path.as_os_str(),
                paths.proof.as_os_str(),
                paths.public_signals.as_os_str(),
            ],
            self.config.command_timeout,
        )
        .await?;

        let triple = load_triple(&paths).await?;

        tracing::info!(
            "Proof generated for commitment={}: {} public signals",
            commitment,
            triple.public_signals.len()
        );

        let dir = dir.to_path_buf();
        if let Err(e) = work_dir.close() {
            tracing::warn!("Failed to clean up work dir {}: {}", dir.display(), e);
        }
        Ok(triple)
    }
}

fn production_error(message: String) -> RelayError {
    RelayError::ArtifactProduction {
        message,
        diagnostics: None,
    }
}

// ─────────────────────────────────────────────
// Command execution with timeout
// ─────────────────────────────────────────────

/// Run a toolchain command to completion.
///
/// The child is killed if it outlives `timeout` or if the returned future is
/// dropped, so a cancelled request leaves no prover process behind.
async fn run_command_with_timeout<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<String, RelayError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| production_error(format!("Failed to spawn {}: {}", program, e)))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => {
            result.map_err(|e| production_error(format!("Failed to wait for {}: {}", program, e)))?
        }
        Err(_) => {
            return Err(production_error(format!(
                "{} timed out after {}s",
                program,
                timeout.as_secs_f64()
            )))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        if !stdout.is_empty() {
            tracing::debug!("{} stdout: {}", program, stdout);
        }
        return Ok(stdout);
    }

    tracing::error!("{} exited with {}", program, output.status);
    let diagnostics = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(RelayError::ArtifactProduction {
        message: format!("{} exited with {}", program, output.status),
        diagnostics: (!diagnostics.trim().is_empty()).then_some(diagnostics),
    })
}
