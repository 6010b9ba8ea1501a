use kata_protocol::{ErrorCode, ErrorEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// Result type for procedure handlers and pipeline links
pub type RpcResult<T> = std::result::Result<T, RpcError>;

pub const INTERNAL_MESSAGE: &str = "Internal server error";

/// A single input rule violation, reported in `error.details`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct FieldIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

/// Errors surfaced by the procedure pipeline
#[derive(Error, Debug)]
pub enum RpcError {
    /// Typed rejection that reaches the caller with its code and message
    #[error("{code}: {message}")]
    Rejected {
        code: ErrorCode,
        message: String,
        issues: Vec<FieldIssue>,
    },

    /// Unexpected failure; logged server-side, never shown to callers
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl RpcError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::rejected(ErrorCode::Unauthorized, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::rejected(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::rejected(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::rejected(ErrorCode::Forbidden, message)
    }

    pub fn banned(message: impl Into<String>) -> Self {
        Self::rejected(ErrorCode::Banned, message)
    }

    pub fn invalid_input(issues: Vec<FieldIssue>) -> Self {
        let message = match issues.as_slice() {
            [only] => format!("Invalid input: {}: {}", only.field, only.message),
            _ => format!("Invalid input: {} issues", issues.len()),
        };
        Self::Rejected {
            code: ErrorCode::BadRequest,
            message,
            issues,
        }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!("{message}"))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected { code, .. } => *code,
            Self::Internal(_) => ErrorCode::InternalServerError,
        }
    }

    /// Caller-facing form. Internal details are replaced by a generic message.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Rejected {
                code,
                message,
                issues,
            } => ErrorEnvelope {
                code: *code,
                message: message.clone(),
                details: if issues.is_empty() {
                    None
                } else {
                    serde_json::to_value(issues).ok()
                },
            },
            Self::Internal(_) => ErrorEnvelope::new(ErrorCode::InternalServerError, INTERNAL_MESSAGE),
        }
    }
}

impl From<DatabaseError> for RpcError {
    fn from(err: DatabaseError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}
