use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::RelayError;
use crate::proof::ProofTriple;

/// Locations of the three JSON artifacts the proving toolchain writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub proof: PathBuf,
    pub public_signals: PathBuf,
    pub verification_key: PathBuf,
}

/// Read a proof triple from disk.
///
/// A missing or unreadable file means the toolchain did not deliver; a file
/// that is present but has the wrong shape is malformed input.
pub async fn load_triple(paths: &ArtifactPaths) -> Result<ProofTriple, RelayError> {
    let proof = read_json(&paths.proof).await?;
    let public_signals = parse_public_signals(read_json(&paths.public_signals).await?)
        .map_err(|e| {
            RelayError::MalformedInput(format!("{}: {}", paths.public_signals.display(), e))
        })?;
    let verification_key = read_json(&paths.verification_key).await?;

    tracing::debug!(
        "Loaded artifacts: proof={} public_signals={} vk={}",
        paths.proof.display(),
        public_signals.len(),
        paths.verification_key.display()
    );

    Ok(ProofTriple {
        proof,
        public_signals,
        verification_key,
    })
}

async fn read_json(path: &Path) -> Result<Value, RelayError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RelayError::ArtifactProduction {
            message: format!("Failed to read artifact at {}: {}", path.display(), e),
            diagnostics: None,
        })?;
    serde_json::from_str(&contents).map_err(|e| {
        RelayError::MalformedInput(format!(
            "Failed to parse artifact at {}: {}",
            path.display(),
            e
        ))
    })
}

/// snarkjs writes public signals as a JSON array of decimal strings.
fn parse_public_signals(value: Value) -> Result<Vec<String>, String> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(format!("expected a JSON array, found {}", type_name(&other))),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("signal {} has type {}", i, type_name(&other))),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
