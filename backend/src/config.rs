use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::imaging::decoder::DEFAULT_MIN_IMAGE_BYTES;
use crate::pyprocess::interpreter::{DEFAULT_CANDIDATES, DEFAULT_FALLBACK};
use crate::pyprocess::invoker::DEFAULT_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub script_path: PathBuf,
    pub model_path: PathBuf,
    pub timeout: Duration,
    pub interpreter_candidates: Vec<String>,
    pub fallback_interpreter: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub scratch_dir: PathBuf,
    pub min_image_bytes: usize,
    pub accuracy_table_path: Option<PathBuf>,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick
    /// up a local `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let body_limit_mb: usize = parse_or(&get, "BODY_LIMIT_MB", "integer", 10)?;
        let body_limit_bytes = body_limit_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid {
                key: "BODY_LIMIT_MB",
                expected: "size in megabytes that fits in memory",
                value: body_limit_mb.to_string(),
            })?;
        let timeout_secs: u64 = parse_or(
            &get,
            "CLASSIFIER_TIMEOUT_SECS",
            "integer",
            DEFAULT_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CLASSIFIER_TIMEOUT_SECS",
                expected: "positive integer",
                value: "0".to_string(),
            });
        }

        let interpreter_candidates = match get("CLASSIFIER_INTERPRETERS") {
            Some(list) => {
                let candidates: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect();
                if candidates.is_empty() {
                    return Err(ConfigError::Empty("CLASSIFIER_INTERPRETERS"));
                }
                candidates
            }
            None => DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", "port number between 0 and 65535", 8081)?,
            body_limit_bytes,
            scratch_dir: get("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage/app")),
            min_image_bytes: parse_or(
                &get,
                "MIN_IMAGE_BYTES",
                "integer",
                DEFAULT_MIN_IMAGE_BYTES,
            )?,
            accuracy_table_path: get("ACCURACY_TABLE_PATH").map(PathBuf::from),
            classifier: ClassifierConfig {
                script_path: get("CLASSIFIER_SCRIPT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("python/predict_sign.py")),
                model_path: get("CLASSIFIER_MODEL")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("python/model.p")),
                timeout: Duration::from_secs(timeout_secs),
                interpreter_candidates,
                fallback_interpreter: get("CLASSIFIER_FALLBACK_INTERPRETER")
                    .unwrap_or_else(|| DEFAULT_FALLBACK.to_string()),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(
    get: &G,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_deployed_layout() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
        assert_eq!(config.body_limit_bytes, 10 * 1024 * 1024);
        assert_eq!(config.scratch_dir, PathBuf::from("storage/app"));
        assert_eq!(config.min_image_bytes, 1000);
        assert_eq!(config.accuracy_table_path, None);
        assert_eq!(config.classifier.timeout, Duration::from_secs(90));
        assert_eq!(
            config.classifier.interpreter_candidates,
            vec!["python", "python3", "py"]
        );
        assert_eq!(config.classifier.fallback_interpreter, "python");
        assert_eq!(
            config.classifier.script_path,
            PathBuf::from("python/predict_sign.py")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("PORT", "5020"),
            ("SCRATCH_DIR", "/tmp/frames"),
            ("CLASSIFIER_TIMEOUT_SECS", "15"),
            ("CLASSIFIER_INTERPRETERS", " python3 , ,/opt/venv/bin/python "),
            ("ACCURACY_TABLE_PATH", "config/accuracy.yaml"),
            ("BODY_LIMIT_MB", "2"),
        ])
        .unwrap();

        assert_eq!(config.port, 5020);
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(config.classifier.timeout, Duration::from_secs(15));
        assert_eq!(
            config.classifier.interpreter_candidates,
            vec!["python3", "/opt/venv/bin/python"]
        );
        assert_eq!(
            config.accuracy_table_path,
            Some(PathBuf::from("config/accuracy.yaml"))
        );
        assert_eq!(config.body_limit_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("ACCURACY_TABLE_PATH", "")]).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.accuracy_table_path, None);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config_from(&[("PORT", "70000")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "PORT must be a valid port number between 0 and 65535, got '70000'"
        );
        assert!(config_from(&[("CLASSIFIER_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("MIN_IMAGE_BYTES", "lots")]).is_err());
        assert!(matches!(
            config_from(&[("CLASSIFIER_INTERPRETERS", ", ,")]),
            Err(ConfigError::Empty(_))
        ));
    }

    #[test]
    fn oversized_body_limit_is_rejected() {
        let huge = (usize::MAX / 1024).to_string();
        match config_from(&[("BODY_LIMIT_MB", huge.as_str())]) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, "BODY_LIMIT_MB");
                assert_eq!(value, huge);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
