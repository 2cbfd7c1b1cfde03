use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for padchat
#[derive(Error, Debug)]
pub enum PadError {
    #[error("IO error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Failed to open database {}: {message}", .path.display())]
    Connection { message: String, path: PathBuf },

    /// The database rejected the statement. The message is the database's own text.
    #[error("{message}")]
    Execution { message: String, sql: String },

    #[error("Could not decode geometry in row {row}: {message}")]
    Decode { message: String, row: usize },

    #[error("SQL generation failed: {message}")]
    Generation { message: String },

    #[error("Unknown model '{label}' (known models: {})", .known.join(", "))]
    UnknownModel { label: String, known: Vec<String> },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },
}

impl PadError {
    /// Create a new IO error with path context
    pub fn io_error(err: std::io::Error, path: Option<impl Into<PathBuf>>) -> Self {
        Self::Io {
            source: err,
            path: path.map(|p| p.into()),
        }
    }

    /// Create a new connection error
    pub fn connection_error(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Connection {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a new execution error for the given statement
    pub fn execution_error(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create a new geometry decode error
    pub fn decode_error(message: impl Into<String>, row: usize) -> Self {
        Self::Decode {
            message: message.into(),
            row,
        }
    }

    /// Create a new generation error
    pub fn generation_error(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a new unknown model error
    pub fn unknown_model(label: impl Into<String>, known: Vec<String>) -> Self {
        Self::UnknownModel {
            label: label.into(),
            known,
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PadError::Io { .. } => "io_error",
            PadError::Connection { .. } => "connection_error",
            PadError::Execution { .. } => "execution_error",
            PadError::Decode { .. } => "decode_error",
            PadError::Generation { .. } => "generation_error",
            PadError::UnknownModel { .. } => "unknown_model",
            PadError::Config { .. } => "config_error",
            PadError::ParseError { .. } => "parse_error",
        }
    }
}

impl From<std::io::Error> for PadError {
    fn from(error: std::io::Error) -> Self {
        PadError::io_error(error, None::<PathBuf>)
    }
}

impl From<serde_json::Error> for PadError {
    fn from(error: serde_json::Error) -> Self {
        PadError::parse_error(error.to_string())
    }
}

impl From<toml::de::Error> for PadError {
    fn from(error: toml::de::Error) -> Self {
        PadError::parse_error(error.to_string())
    }
}

impl From<toml::ser::Error> for PadError {
    fn from(error: toml::ser::Error) -> Self {
        PadError::parse_error(error.to_string())
    }
}

/// Result type alias using PadError
pub type PadResult<T> = Result<T, PadError>;

/// Extension trait for converting errors to PadError
pub trait ErrorExt<T> {
    /// Convert to PadResult, treating the failure as a database execution error
    fn for_sql(self, sql: &str) -> PadResult<T>;

    /// Convert to PadResult with file path context
    fn with_path(self, path: impl Into<PathBuf>) -> PadResult<T>;
}

impl<T, E: fmt::Display> ErrorExt<T> for Result<T, E> {
    fn for_sql(self, sql: &str) -> PadResult<T> {
        self.map_err(|e| PadError::execution_error(e.to_string(), sql))
    }

    fn with_path(self, path: impl Into<PathBuf>) -> PadResult<T> {
        let path = path.into();
        self.map_err(|e| PadError::connection_error(e.to_string(), path))
    }
}

/// Contextual error mapping function
pub fn map_io_err<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> PadError {
    let path = path.into();
    move |err| PadError::io_error(err, Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_verbatim() {
        let err = PadError::execution_error("Parser Error: syntax error at or near \"selec\"", "selec 1");
        assert_eq!(err.to_string(), "Parser Error: syntax error at or near \"selec\"");
        assert_eq!(err.kind(), "execution_error");
    }

    #[test]
    fn test_unknown_model_lists_labels() {
        let err = PadError::unknown_model("gpt-9", vec!["sqlcoder".to_string(), "zephyr".to_string()]);
        assert_eq!(
            err.to_string(),
            "Unknown model 'gpt-9' (known models: sqlcoder, zephyr)"
        );
    }

    #[test]
    fn test_for_sql_wraps_display() {
        let result: Result<(), String> = Err("Catalog Error: Table with name nope does not exist!".to_string());
        match result.for_sql("select * from nope") {
            Err(PadError::Execution { message, sql }) => {
                assert!(message.starts_with("Catalog Error"));
                assert_eq!(sql, "select * from nope");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
