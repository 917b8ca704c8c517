//! Error handling for the tally-common crate.

use thiserror::Error;

/// Common error type shared by the tally crates.
///
/// Every variant carries a human readable message and an optional
/// underlying cause so that errors coming from `std`, `serde_json` or
/// `humantime` can be chained without losing context.
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid configuration: {message}")]
    ConfigurationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("IO operation failed: {message}")]
    IoError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Parse failed: {message}")]
    ParseError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

impl CommonError {
    /// Create a configuration error with a custom message.
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with a custom message and source error.
    pub fn configuration_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an IO error with a custom message.
    pub fn io_error<S: Into<String>>(message: S) -> Self {
        Self::IoError {
            message: message.into(),
            source: None,
        }
    }

    /// Create an IO error with a custom message and source error.
    pub fn io_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::IoError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a parse error with a custom message.
    pub fn parse_error<S: Into<String>>(message: S) -> Self {
        Self::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with a custom message and source error.
    pub fn parse_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an internal error with a custom message.
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
            source: None,
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigurationError { message, .. }
            | Self::IoError { message, .. }
            | Self::ParseError { message, .. }
            | Self::InternalError { message, .. } => message,
        }
    }

    /// Whether the error was caused by user supplied settings rather than
    /// the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError { .. } | Self::ParseError { .. }
        )
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::io_error_with_source(err.to_string(), err)
    }
}

/// Context helpers for attaching a message to foreign errors.
pub mod context {
    use super::*;

    /// Extension trait for adding context to Results.
    pub trait ErrorContext<T> {
        /// Wrap the error as an IO error with the given context.
        fn with_io_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        /// Wrap the error as a configuration error with the given context.
        fn with_config_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        /// Wrap the error as a parse error with the given context.
        fn with_parse_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;
    }

    impl<T, E> ErrorContext<T> for std::result::Result<T, E>
    where
        E: Into<anyhow::Error>,
    {
        fn with_io_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::io_error_with_source(f(), e.into()))
        }

        fn with_config_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::configuration_error_with_source(f(), e.into()))
        }

        fn with_parse_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::parse_error_with_source(f(), e.into()))
        }
    }
}

pub use context::ErrorContext;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::error::Error;

    #[test]
    fn test_error_creation() {
        let config_error = CommonError::configuration_error("bad master");
        assert!(matches!(config_error, CommonError::ConfigurationError { .. }));
        assert_eq!(config_error.message(), "bad master");
        assert!(config_error.is_user_error());

        let io_error = CommonError::io_error_with_source("read failed", anyhow!("disk gone"));
        assert!(matches!(io_error, CommonError::IoError { .. }));
        assert!(!io_error.is_user_error());
    }

    #[test]
    fn test_error_chaining() {
        let err = CommonError::parse_error_with_source("bad duration", anyhow!("unknown unit"));
        assert_eq!(err.to_string(), "Parse failed: bad duration");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_context_extension() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result
            .with_io_context(|| "opening input".to_string())
            .unwrap_err();
        assert!(matches!(err, CommonError::IoError { .. }));
        assert_eq!(err.message(), "opening input");
    }

    #[test]
    fn test_from_io_error() {
        let err: CommonError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, CommonError::IoError { .. }));
    }
}
