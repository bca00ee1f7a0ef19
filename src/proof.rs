use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Proof, public signals and verification key produced for one circuit instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofTriple {
    pub proof: Value,
    /// Field elements as decimal strings. Index 0 is the attested commitment.
    pub public_signals: Vec<String>,
    #[serde(rename = "vk")]
    pub verification_key: Value,
}

impl ProofTriple {
    pub fn commitment(&self) -> Option<&str> {
        self.public_signals.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProofOptions {
    pub library: String,
    pub curve: String,
}

/// Body of `POST /submit-proof/{token}`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    proof_type: String,
    vk_registered: bool,
    proof_options: ProofOptions,
    proof_data: ProofTriple,
}

impl SubmissionRequest {
    pub fn proof_type(&self) -> &str {
        &self.proof_type
    }

    pub fn vk_registered(&self) -> bool {
        self.vk_registered
    }

    pub fn proof_options(&self) -> &ProofOptions {
        &self.proof_options
    }

    pub fn proof_data(&self) -> &ProofTriple {
        &self.proof_data
    }

    pub fn commitment(&self) -> &str {
        // build() rejects empty public signals
        self.proof_data.commitment().unwrap_or_default()
    }
}

/// Fixed protocol parameters stamped onto every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionProfile {
    pub proof_type: String,
    pub library: String,
    pub curve: String,
    pub vk_registered: bool,
}

impl Default for SubmissionProfile {
    fn default() -> Self {
        Self {
            proof_type: "groth16".to_string(),
            library: "snarkjs".to_string(),
            curve: "bn128".to_string(),
            vk_registered: false,
        }
    }
}

const GROTH16_PROOF_FIELDS: [&str; 3] = ["pi_a", "pi_b", "pi_c"];

impl SubmissionProfile {
    /// Assemble a submission from a proof triple. Pure: no I/O, same input gives same output.
    pub fn build(&self, triple: ProofTriple) -> Result<SubmissionRequest, RelayError> {
        self.check_proof(&triple.proof)?;

        if triple.public_signals.is_empty() {
            return Err(RelayError::MalformedInput(
                "publicSignals must not be empty".to_string(),
            ));
        }
        if let Some(idx) = triple.public_signals.iter().position(|s| s.trim().is_empty()) {
            return Err(RelayError::MalformedInput(format!(
                "publicSignals[{}] is empty",
                idx
            )));
        }

        match &triple.verification_key {
            Value::Object(map) if !map.is_empty() => {}
            Value::Null => {
                return Err(RelayError::MalformedInput(
                    "verification key is missing".to_string(),
                ))
            }
            _ => {
                return Err(RelayError::MalformedInput(
                    "verification key must be a non-empty JSON object".to_string(),
                ))
            }
        }

        Ok(SubmissionRequest {
            proof_type: self.proof_type.clone(),
            vk_registered: self.vk_registered,
            proof_options: ProofOptions {
                library: self.library.clone(),
                curve: self.curve.clone(),
            },
            proof_data: triple,
        })
    }

    fn check_proof(&self, proof: &Value) -> Result<(), RelayError> {
        let map = match proof {
            Value::Object(map) if !map.is_empty() => map,
            Value::Null => return Err(RelayError::MalformedInput("proof is missing".to_string())),
            _ => {
                return Err(RelayError::MalformedInput(
                    "proof must be a non-empty JSON object".to_string(),
                ))
            }
        };

        if self.proof_type == "groth16" {
            if let Some(field) = GROTH16_PROOF_FIELDS.iter().find(|f| !map.contains_key(**f)) {
                return Err(RelayError::MalformedInput(format!(
                    "groth16 proof is missing '{}'",
                    field
                )));
            }
        }
        Ok(())
    }
}
