//! Run configuration, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_BASE_URL, LlmConfig};
use crate::pipeline::RetrievalConfig;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where the input tables are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputConfig {
    /// `<dir>/products.csv` and `<dir>/emails.csv`.
    CsvDir(PathBuf),
    /// A shared Google spreadsheet with `products` and `emails` sheets.
    Sheets { spreadsheet_id: String },
}

/// Everything a run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub input: InputConfig,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    /// Keep output in memory and print it instead of writing files.
    pub dry_run: bool,
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let timeout_secs: u64 =
            parse_or(&get, "MAILROOM_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(invalid("MAILROOM_REQUEST_TIMEOUT_SECS", "must be at least 1"));
        }

        let llm = LlmConfig {
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: SecretString::from(api_key),
            model: get("MAILROOM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: get("MAILROOM_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        };

        let defaults = RetrievalConfig::default();
        let retrieval = RetrievalConfig {
            top_k: parse_or(&get, "MAILROOM_TOP_K", defaults.top_k)?,
            min_score: parse_or(&get, "MAILROOM_MIN_SIMILARITY", defaults.min_score)?,
            chunk_size: parse_or(&get, "MAILROOM_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&get, "MAILROOM_CHUNK_OVERLAP", defaults.chunk_overlap)?,
        };
        if retrieval.top_k == 0 {
            return Err(invalid("MAILROOM_TOP_K", "must be at least 1"));
        }
        if retrieval.chunk_size == 0 {
            return Err(invalid("MAILROOM_CHUNK_SIZE", "must be at least 1"));
        }
        if retrieval.chunk_overlap >= retrieval.chunk_size {
            return Err(invalid(
                "MAILROOM_CHUNK_OVERLAP",
                "must be smaller than MAILROOM_CHUNK_SIZE",
            ));
        }
        if !retrieval.min_score.is_finite() {
            return Err(invalid("MAILROOM_MIN_SIMILARITY", "must be a finite number"));
        }

        let input = match get("SPREADSHEET_ID") {
            Some(spreadsheet_id) => InputConfig::Sheets { spreadsheet_id },
            None => InputConfig::CsvDir(
                get("MAILROOM_DATA_DIR")
                    .unwrap_or_else(|| "./data".into())
                    .into(),
            ),
        };

        Ok(Self {
            llm,
            retrieval,
            input,
            output_dir: get("MAILROOM_OUTPUT_DIR")
                .unwrap_or_else(|| "./outputs".into())
                .into(),
            log_file: get("MAILROOM_LOG_FILE")
                .unwrap_or_else(|| "./mailroom.log".into())
                .into(),
            dry_run: parse_bool(&get, "MAILROOM_DRY_RUN")?,
        })
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Parse `key` if set, else return `default`. A set but unparseable value is an error.
fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e| invalid(key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(invalid(key, format!("expected true or false, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_api_key() {
        let config = config(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.llm.request_timeout, Duration::from_secs(60));
        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(config.input, InputConfig::CsvDir(PathBuf::from("./data")));
        assert_eq!(config.output_dir, PathBuf::from("./outputs"));
        assert_eq!(config.log_file, PathBuf::from("./mailroom.log"));
        assert!(!config.dry_run);
    }

    #[test]
    fn missing_api_key() {
        match config(&[("MAILROOM_MODEL", "gpt-4o-mini")]) {
            Err(ConfigError::MissingEnvVar(key)) => assert_eq!(key, "OPENAI_API_KEY"),
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
        assert!(config(&[("OPENAI_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
            ("MAILROOM_MODEL", "gpt-4o-mini"),
            ("MAILROOM_TOP_K", "5"),
            ("MAILROOM_MIN_SIMILARITY", "0.25"),
            ("MAILROOM_CHUNK_SIZE", "500"),
            ("MAILROOM_CHUNK_OVERLAP", "50"),
            ("SPREADSHEET_ID", "14fKHsblfqZfWj3iAaM2oA51TlYfQlFT4WKo52fVaQ9U"),
            ("MAILROOM_DRY_RUN", "yes"),
        ])
        .unwrap();
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.min_score, 0.25);
        assert_eq!(config.retrieval.chunk_size, 500);
        assert_eq!(config.retrieval.chunk_overlap, 50);
        assert!(matches!(config.input, InputConfig::Sheets { .. }));
        assert!(config.dry_run);
    }

    #[test]
    fn rejects_zero_top_k() {
        match config(&[("OPENAI_API_KEY", "k"), ("MAILROOM_TOP_K", "0")]) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "MAILROOM_TOP_K"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        let result = config(&[
            ("OPENAI_API_KEY", "k"),
            ("MAILROOM_CHUNK_SIZE", "200"),
            ("MAILROOM_CHUNK_OVERLAP", "200"),
        ]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn rejects_unparseable_numbers_and_flags() {
        assert!(config(&[("OPENAI_API_KEY", "k"), ("MAILROOM_TOP_K", "three")]).is_err());
        assert!(
            config(&[("OPENAI_API_KEY", "k"), ("MAILROOM_REQUEST_TIMEOUT_SECS", "0")]).is_err()
        );
        assert!(config(&[("OPENAI_API_KEY", "k"), ("MAILROOM_DRY_RUN", "maybe")]).is_err());
    }
}
