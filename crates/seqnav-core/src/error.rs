use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeqError {
    #[error("tree shape is empty: {0}")]
    EmptyInput(String),

    #[error("malformed tree shape: {0}")]
    MalformedShape(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("activity not found: {0}")]
    ActivityNotFound(String),

    #[error("sequencing session not active")]
    SessionNotActive,

    #[error("Invalid navigation request type: '{0}'")]
    InvalidRequestType(String),

    #[error("{request} request requires a target activity")]
    MissingTarget { request: String },

    #[error("No current activity")]
    NoCurrentActivity,

    /// A sequencing exception raised by one of the navigation subprocesses.
    /// `code` follows the IMS pseudo-code numbering (e.g. `SB.2.1-3`).
    #[error("{message} ({code})")]
    Sequencing { code: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SeqError {
    pub fn exception(code: &'static str, message: impl Into<String>) -> Self {
        SeqError::Sequencing {
            code,
            message: message.into(),
        }
    }

    /// Stable, caller-facing error code.
    pub fn code(&self) -> &'static str {
        match self {
            SeqError::EmptyInput(_) => "PARSE_EMPTY_INPUT",
            SeqError::MalformedShape(_) => "PARSE_XML_ERROR",
            SeqError::Validation(_) => "PARSE_VALIDATION_ERROR",
            SeqError::ActivityNotFound(_) => "ACTIVITY_NOT_FOUND",
            SeqError::SessionNotActive => "SESSION_NOT_ACTIVE",
            SeqError::InvalidRequestType(_) => "INVALID_REQUEST_TYPE",
            SeqError::MissingTarget { .. } => "MISSING_TARGET",
            SeqError::NoCurrentActivity => "NO_CURRENT_ACTIVITY",
            SeqError::Sequencing { .. } => "SEQUENCING_EXCEPTION",
            SeqError::Io(_) => "IO_ERROR",
            SeqError::Yaml(_) => "YAML_ERROR",
            SeqError::Json(_) => "JSON_ERROR",
        }
    }

    /// The IMS exception code for sequencing failures, if any.
    pub fn exception_code(&self) -> Option<&'static str> {
        match self {
            SeqError::Sequencing { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for errors raised while building a tree from its shape.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            SeqError::EmptyInput(_) | SeqError::MalformedShape(_) | SeqError::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SeqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_have_stable_codes() {
        assert_eq!(SeqError::EmptyInput("null".into()).code(), "PARSE_EMPTY_INPUT");
        assert_eq!(SeqError::MalformedShape("x".into()).code(), "PARSE_XML_ERROR");
        assert_eq!(
            SeqError::Validation("No items in default organization".into()).code(),
            "PARSE_VALIDATION_ERROR"
        );
        assert!(SeqError::Validation(String::new()).is_parse_error());
        assert!(!SeqError::SessionNotActive.is_parse_error());
    }

    #[test]
    fn messages_carry_caller_visible_phrases() {
        assert!(SeqError::SessionNotActive.to_string().contains("not active"));
        assert!(SeqError::InvalidRequestType("jumpAround".into())
            .to_string()
            .contains("Invalid navigation request type"));
        assert!(SeqError::ActivityNotFound("x".into())
            .to_string()
            .contains("not found"));
        assert_eq!(SeqError::NoCurrentActivity.to_string(), "No current activity");
    }

    #[test]
    fn exception_code_is_exposed() {
        let err = SeqError::exception("SB.2.1-3", "Previous request failed");
        assert_eq!(err.exception_code(), Some("SB.2.1-3"));
        assert_eq!(err.code(), "SEQUENCING_EXCEPTION");
        assert_eq!(err.to_string(), "Previous request failed (SB.2.1-3)");
    }
}
