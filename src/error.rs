//! Error types for mailroom.
//!
//! One enum per concern. The binary joins them with `anyhow` at startup.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors reading the product and email tables.
///
/// `InvalidRow` is recoverable: the loader skips the row and keeps going.
/// Everything else means the table as a whole could not be read.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to read table {table}: {reason}")]
    Unreadable { table: String, reason: String },

    #[error("Table {table} is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Table {table}, line {line}: {reason}")]
    InvalidRow {
        table: String,
        line: u64,
        reason: String,
    },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors writing the output tables.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to write table {table}: {reason}")]
    Write { table: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-email processing failures.
///
/// The runner logs these and moves on to the next email.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Model service failed during {stage}: {source}")]
    Service {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("Could not parse model output during {stage}: {reason}")]
    Parse { stage: Stage, reason: String },

    #[error("Output error: {0}")]
    Output(#[from] OutputError),
}

impl PipelineError {
    pub fn service(stage: Stage, source: LlmError) -> Self {
        Self::Service { stage, source }
    }

    pub fn parse(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Parse {
            stage,
            reason: reason.into(),
        }
    }

    /// Stage the failure happened in, if it came from a model step.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Service { stage, .. } | Self::Parse { stage, .. } => Some(*stage),
            Self::Output(_) => None,
        }
    }
}

/// Pipeline step that talks to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classification,
    OrderExtraction,
    Retrieval,
    Response,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::OrderExtraction => "order extraction",
            Self::Retrieval => "retrieval",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_stage() {
        let err = PipelineError::parse(Stage::Classification, "unknown label 'refund'");
        assert_eq!(err.stage(), Some(Stage::Classification));
        let msg = err.to_string();
        assert!(msg.contains("classification"));
        assert!(msg.contains("refund"));
    }

    #[test]
    fn service_error_wraps_llm_error() {
        let err = PipelineError::service(
            Stage::Response,
            LlmError::AuthFailed {
                provider: "openai".into(),
            },
        );
        assert_eq!(err.stage(), Some(Stage::Response));
        assert!(err.to_string().contains("Authentication failed"));
    }

    #[test]
    fn output_error_has_no_stage() {
        let err = PipelineError::from(OutputError::Write {
            table: "order-status".into(),
            reason: "disk full".into(),
        });
        assert!(err.stage().is_none());
    }
}
