//! Error types shared by the renderer and the tool servers.

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Failures raised while turning a value tree into markdown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Nesting went past the configured depth limit.
    #[error("Malformed input: nesting depth {depth} exceeds limit of {limit}")]
    MalformedInput { depth: usize, limit: usize },

    /// A top-level render was attempted on something other than a mapping.
    #[error("Expected a mapping, found {found}")]
    NotAMapping { found: &'static str },

    /// A typed response could not be converted into a value tree.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors a tool call can end with.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The caller passed bad arguments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The vendor service or the network failed.
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// The vendor answered but had nothing for the request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local formatting failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Missing credentials or bad configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn upstream(service: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: message.to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Only upstream failures are worth retrying; everything else needs the
    /// caller or operator to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }

    /// True when the caller supplied the bad data.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }
}
