/// Result alias that carries the custom [`PhonoscopeError`] type.
pub type Result<T> = std::result::Result<T, PhonoscopeError>;

/// Common error type for the core crate.
///
/// Most of these never leave the crate: the visualization boundary logs and
/// swallows them so one broken style cannot take the page down.
#[derive(Debug, thiserror::Error)]
pub enum PhonoscopeError {
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or state payload could not be (de)serialized.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A container or surface the caller expected is not in the document.
    #[error("element `{0}` not found")]
    MissingElement(String),
    /// No visualization registered under the requested key.
    #[error("unknown visualization `{0}`")]
    UnknownVisualization(String),
    /// A plugin callback failed.
    #[error("visualization `{key}` failed: {message}")]
    Plugin { key: String, message: String },
    /// A platform capability the visualization needs is not available.
    #[error("unsupported environment: {0}")]
    Unsupported(String),
}

impl PhonoscopeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn plugin(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for PhonoscopeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PhonoscopeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_errors_name_the_visualization() {
        let err = PhonoscopeError::plugin("spiral", "no layers");
        assert_eq!(format!("{err}"), "visualization `spiral` failed: no layers");
    }

    #[test]
    fn strings_convert_into_messages() {
        let err: PhonoscopeError = "boom".into();
        assert!(matches!(err, PhonoscopeError::Message(ref m) if m == "boom"));
    }
}
