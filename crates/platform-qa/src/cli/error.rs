//! Error types for the CLI

use platform_qa_common::telemetry::TelemetryError;

/// CLI Result type
pub type CliResult<T> = std::result::Result<T, CliError>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Resolving a service or identity failed
    #[error(transparent)]
    Resolve(#[from] crate::Error),

    /// A flag the chosen service needs was not given
    #[error("{flag} is required for {context}")]
    MissingArgument {
        /// The missing flag, as typed on the command line
        flag: &'static str,
        /// What needed it
        context: String,
    },

    /// The tracing subscriber could not be installed
    #[error("logging setup failed: {0}")]
    Logging(#[from] TelemetryError),

    /// Output could not be rendered as JSON
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading input or writing output failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// `flag` was required for `context`
    pub fn missing_argument(flag: &'static str, context: impl Into<String>) -> Self {
        Self::MissingArgument {
            flag,
            context: context.into(),
        }
    }
}
