//! Typed tool failures.
//!
//! Every capability returns `Result<String, ToolError>`; the subsystem turns
//! the error half into the wire [`ToolFailure`] via [`ToolError::to_failure`].

use thiserror::Error;

use crate::supervisor::bus::ToolFailure;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Input did not have the declared shape.
    #[error("{0}")]
    InvalidInput(String),
    /// The permission model refused the request.
    #[error("{0}")]
    Denied(String),
    #[error("{0}")]
    NotFound(String),
    /// The backing system (database, process, filesystem, gateway) failed.
    #[error("{0}")]
    Backend(String),
    #[error("{0}")]
    Timeout(String),
    /// Disabled or missing credentials.
    #[error("{0}")]
    Unavailable(String),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::InvalidInput(_) => "invalid_input",
            ToolError::Denied(_) => "denied",
            ToolError::NotFound(_) => "not_found",
            ToolError::Backend(_) => "backend",
            ToolError::Timeout(_) => "timeout",
            ToolError::Unavailable(_) => "unavailable",
        }
    }

    /// Whether retrying with different input can succeed.
    pub fn recoverable(&self) -> bool {
        !matches!(self, ToolError::Denied(_) | ToolError::Unavailable(_))
    }

    pub fn to_failure(&self) -> ToolFailure {
        ToolFailure {
            code: self.code().to_string(),
            message: self.to_string(),
            recoverable: self.recoverable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_and_unavailable_are_not_recoverable() {
        assert!(!ToolError::Denied("x".into()).recoverable());
        assert!(!ToolError::Unavailable("x".into()).recoverable());
        for e in [
            ToolError::InvalidInput("x".into()),
            ToolError::NotFound("x".into()),
            ToolError::Backend("x".into()),
            ToolError::Timeout("x".into()),
        ] {
            assert!(e.recoverable(), "{} should be recoverable", e.code());
        }
    }

    #[test]
    fn failure_carries_code_and_message() {
        let f = ToolError::Backend("Failed to execute query".into()).to_failure();
        assert_eq!(f.code, "backend");
        assert_eq!(f.message, "Failed to execute query");
        assert!(f.recoverable);
    }
}
