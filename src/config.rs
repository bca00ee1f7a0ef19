//! Service configuration, read from environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::artifacts::ArtifactPaths;
use crate::proof::SubmissionProfile;
use crate::prover::ProverConfig;
use crate::relay::{AccessToken, PollPolicy, RelaySettings, StatusSet};
use crate::retry::RetryPolicy;

pub const DEFAULT_RELAY_URL: &str = "https://relayer-api.horizenlabs.io/api/v1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// HTTP service exposing `POST /verify`.
    Serve,
    /// Submit the proof artifacts already on disk and wait for finalization.
    Submit,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub host: String,
    pub port: u16,
    /// Overall budget for one `/verify` request, proving included.
    pub request_deadline: Duration,
    pub relay: RelaySettings,
    pub profile: SubmissionProfile,
    pub prover: ProverConfig,
    /// Inputs for [`Mode::Submit`].
    pub artifacts: ArtifactPaths,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Source(lookup);

        let mode = match env.string("MODE", "serve").as_str() {
            "serve" => Mode::Serve,
            "submit" => Mode::Submit,
            other => {
                return Err(ConfigError::Invalid {
                    key: "MODE",
                    value: other.to_string(),
                    reason: "expected 'serve' or 'submit'".to_string(),
                })
            }
        };

        let token = env.get("API_KEY").ok_or(ConfigError::Missing("API_KEY"))?;
        if token.trim().is_empty() {
            return Err(ConfigError::Missing("API_KEY"));
        }

        let base_url = env.string("RELAY_BASE_URL", DEFAULT_RELAY_URL);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "RELAY_BASE_URL",
                value: base_url,
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let poll = PollPolicy {
            interval: env.positive_millis("POLL_INTERVAL_MS", 3_000)?,
            max_duration: env.positive_millis("MAX_POLL_DURATION_MS", 300_000)?,
            max_attempts: env.optional("MAX_POLL_ATTEMPTS")?,
        };
        if poll.max_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                key: "MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let base_delay = env.millis("RETRY_BASE_DELAY_MS", 200)?;
        let max_delay = env.millis("RETRY_MAX_DELAY_MS", 5_000)?;
        let retry = |max_retries| RetryPolicy {
            max_retries,
            base_delay,
            max_delay,
        };

        let relay = RelaySettings {
            base_url,
            access_token: AccessToken::new(token),
            request_timeout: env.positive_millis("RELAY_REQUEST_TIMEOUT_MS", 30_000)?,
            poll,
            submit_retry: retry(env.parsed("SUBMIT_RETRIES", 2)?),
            status_retry: retry(env.parsed("STATUS_QUERY_RETRIES", 3)?),
            statuses: StatusSet {
                finalized: env.string("RELAY_FINALIZED_STATUS", "Finalized"),
                pending: env.list("RELAY_PENDING_STATUSES", &StatusSet::default().pending),
                failed: env.list("RELAY_FAILURE_STATUSES", &StatusSet::default().failed),
            },
        };

        let defaults = SubmissionProfile::default();
        let profile = SubmissionProfile {
            proof_type: env.string("PROOF_TYPE", &defaults.proof_type),
            library: env.string("PROOF_LIBRARY", &defaults.library),
            curve: env.string("PROOF_CURVE", &defaults.curve),
            vk_registered: env.parsed("VK_REGISTERED", defaults.vk_registered)?,
        };

        let prover_defaults = ProverConfig::default();
        let verification_key = env.path("VERIFICATION_KEY", &prover_defaults.verification_key);
        let prover = ProverConfig {
            node_path: env.string("NODE_PATH", &prover_defaults.node_path),
            snarkjs_path: env.string("SNARKJS_PATH", &prover_defaults.snarkjs_path),
            witness_generator: env.path("WITNESS_GENERATOR", &prover_defaults.witness_generator),
            circuit_wasm: env.path("CIRCUIT_WASM", &prover_defaults.circuit_wasm),
            proving_key: env.path("PROVING_KEY", &prover_defaults.proving_key),
            verification_key: verification_key.clone(),
            command_timeout: env.positive_millis("PROVER_TIMEOUT_MS", 120_000)?,
        };

        let artifacts = ArtifactPaths {
            proof: env.path("PROOF_PATH", Path::new("data/proof.json")),
            public_signals: env.path("PUBLIC_SIGNALS_PATH", Path::new("data/public.json")),
            verification_key,
        };

        Ok(Self {
            mode,
            host: env.string("HOST", "0.0.0.0"),
            port: env.parsed("PORT", 4000)?,
            request_deadline: env.positive_millis("REQUEST_DEADLINE_MS", 600_000)?,
            relay,
            profile,
            prover,
            artifacts,
        })
    }
}

struct Source<F>(F);

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn path(&self, key: &str, default: &Path) -> PathBuf {
        self.get(key)
            .map(PathBuf::from)
            .unwrap_or_else(|| default.to_path_buf())
    }

    fn list(&self, key: &str, default: &[String]) -> Vec<String> {
        match self.get(key) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => default.to_vec(),
        }
    }

    fn optional<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                    key,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.optional(key)?.unwrap_or(default))
    }

    fn millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed(key, default).map(Duration::from_millis)
    }

    fn positive_millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let value = self.millis(key, default)?;
        if value.is_zero() {
            return Err(ConfigError::Invalid {
                key,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("API_KEY", "secret")]).unwrap();
        assert_eq!(config.mode, Mode::Serve);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.request_deadline, Duration::from_secs(600));
        assert_eq!(config.relay.base_url, DEFAULT_RELAY_URL);
        assert_eq!(config.relay.access_token.expose(), "secret");
        assert_eq!(config.relay.poll.interval, Duration::from_secs(3));
        assert_eq!(config.relay.poll.max_duration, Duration::from_secs(300));
        assert_eq!(config.relay.poll.max_attempts, None);
        assert_eq!(config.relay.submit_retry.max_retries, 2);
        assert_eq!(config.relay.status_retry.max_retries, 3);
        assert_eq!(config.relay.statuses, StatusSet::default());
        assert_eq!(config.profile, SubmissionProfile::default());
        assert_eq!(config.prover, ProverConfig::default());
        assert_eq!(config.artifacts.proof, PathBuf::from("data/proof.json"));
        assert_eq!(
            config.artifacts.verification_key,
            PathBuf::from("data/verification_key.json")
        );
    }

    #[test]
    fn test_missing_api_key() {
        assert_eq!(config_from(&[]).unwrap_err(), ConfigError::Missing("API_KEY"));
        assert_eq!(
            config_from(&[("API_KEY", "  ")]).unwrap_err(),
            ConfigError::Missing("API_KEY")
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("API_KEY", "k"),
            ("MODE", "submit"),
            ("PORT", "8080"),
            ("RELAY_BASE_URL", "http://localhost:9000/api/v1"),
            ("POLL_INTERVAL_MS", "500"),
            ("MAX_POLL_DURATION_MS", "10000"),
            ("MAX_POLL_ATTEMPTS", "7"),
            ("RELAY_PENDING_STATUSES", "Queued, Processing"),
            ("RELAY_FAILURE_STATUSES", "Failed,Rejected"),
            ("PROOF_CURVE", "bls12381"),
            ("VK_REGISTERED", "true"),
            ("VERIFICATION_KEY", "data/main.groth16.vkey.json"),
        ])
        .unwrap();

        assert_eq!(config.mode, Mode::Submit);
        assert_eq!(config.port, 8080);
        assert_eq!(config.relay.base_url, "http://localhost:9000/api/v1");
        assert_eq!(config.relay.poll.interval, Duration::from_millis(500));
        assert_eq!(config.relay.poll.max_duration, Duration::from_secs(10));
        assert_eq!(config.relay.poll.max_attempts, Some(7));
        assert_eq!(config.relay.statuses.pending, vec!["Queued", "Processing"]);
        assert_eq!(config.relay.statuses.failed, vec!["Failed", "Rejected"]);
        assert_eq!(config.profile.curve, "bls12381");
        assert!(config.profile.vk_registered);
        assert_eq!(
            config.prover.verification_key,
            PathBuf::from("data/main.groth16.vkey.json")
        );
        assert_eq!(config.artifacts.verification_key, config.prover.verification_key);
    }

    #[test]
    fn test_invalid_number() {
        let err = config_from(&[("API_KEY", "k"), ("POLL_INTERVAL_MS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "POLL_INTERVAL_MS", .. }));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = config_from(&[("API_KEY", "k"), ("POLL_INTERVAL_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "POLL_INTERVAL_MS", .. }));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let err = config_from(&[("API_KEY", "k"), ("MAX_POLL_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_POLL_ATTEMPTS", .. }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = config_from(&[("API_KEY", "k"), ("MODE", "batch")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MODE", .. }));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let err = config_from(&[("API_KEY", "k"), ("RELAY_BASE_URL", "ftp://relay")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RELAY_BASE_URL", .. }));
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let config = config_from(&[("API_KEY", "do-not-print")]).unwrap();
        assert!(!format!("{:?}", config).contains("do-not-print"));
    }
}
