//! Error types for nimbus
//!
//! All modules use `NimbusResult<T>` as their return type.

use thiserror::Error;

/// Result type alias for nimbus operations
pub type NimbusResult<T> = Result<T, NimbusError>;

/// All errors that can occur in nimbus
#[derive(Error, Debug)]
pub enum NimbusError {
    // Resource errors
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Failed to read resource {path}: {source}")]
    ResourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Compile errors
    #[error("Compile error in {file}:{line}: {message}")]
    Compile {
        file: String,
        line: u32,
        message: String,
    },

    // Execution errors
    #[error("Execution error in {context}: {message}")]
    Execution { context: String, message: String },

    // Template errors
    #[error("Could not load template [{name}] at path [{path}]")]
    TemplateNotFound { name: String, path: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl NimbusError {
    /// Create a resource read error with its logical path
    pub fn read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::ResourceRead {
            path: path.into(),
            source,
        }
    }

    /// Create a compile error carrying file name and source position
    pub fn compile(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self::Compile {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether the error aborts only the in-flight request, leaving the
    /// shared caches serving the last good entries
    pub fn is_request_fatal_only(&self) -> bool {
        !matches!(self, Self::ConfigInvalid { .. } | Self::TomlParse(_))
    }

    /// Whether a previously cached unit survives this error (stale-but-working
    /// fallback: a failed recompile never evicts the last good compile)
    pub fn keeps_last_good(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }
}
