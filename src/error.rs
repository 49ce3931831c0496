use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HalluscanError {
    #[error("Code must not be empty")]
    EmptyCode,

    #[error("Code is {len} bytes, the limit is {max}")]
    CodeTooLong { len: usize, max: usize },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Analysis aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, HalluscanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_empty_code() {
        assert_eq!(HalluscanError::EmptyCode.to_string(), "Code must not be empty");
    }

    #[test]
    fn test_error_display_code_too_long() {
        let err = HalluscanError::CodeTooLong {
            len: 100_001,
            max: 100_000,
        };
        assert_eq!(err.to_string(), "Code is 100001 bytes, the limit is 100000");
    }

    #[test]
    fn test_error_display_unsupported_language() {
        let err = HalluscanError::UnsupportedLanguage("cobol".to_string());
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }

    #[test]
    fn test_error_display_io() {
        let err = HalluscanError::Io {
            path: "/path/to/file.py".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "Failed to access /path/to/file.py: not found");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HalluscanError = json_err.into();
        assert!(err.to_string().starts_with("JSON serialization error"));
    }

    #[test]
    fn test_error_from_config() {
        let err: HalluscanError = ConfigError::Invalid("bad threshold".to_string()).into();
        assert_eq!(err.to_string(), "Invalid configuration: bad threshold");
    }
}
