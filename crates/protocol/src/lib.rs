use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod path;

pub use path::ProcedurePath;

pub const LISTING_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    Query,
    Mutation,
}

impl ProcedureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProcedureKind::Query => "query",
            ProcedureKind::Mutation => "mutation",
        }
    }
}

impl std::fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may call a procedure.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Protected,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    NotFound,
    Forbidden,
    Banned,
    InternalServerError,
    /// Any code this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Banned => "BANNED",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::Unauthorized => 401,
            ErrorCode::BadRequest => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Forbidden | ErrorCode::Banned => 403,
            ErrorCode::InternalServerError | ErrorCode::Unknown => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}

/// An inbound procedure call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct RpcCall {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ProcedureKind,
    #[serde(default)]
    pub input: Value,
}

impl RpcCall {
    pub fn query(path: impl Into<String>, input: Value) -> Self {
        Self {
            path: path.into(),
            kind: ProcedureKind::Query,
            input,
        }
    }

    pub fn mutation(path: impl Into<String>, input: Value) -> Self {
        Self {
            path: path.into(),
            kind: ProcedureKind::Mutation,
            input,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct RpcResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl RpcResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorEnvelope) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn http_status(&self) -> u16 {
        match &self.error {
            Some(error) if !self.ok => error.code.http_status(),
            None if !self.ok => ErrorCode::InternalServerError.http_status(),
            _ => 200,
        }
    }

    pub fn into_result(self) -> std::result::Result<Value, ErrorEnvelope> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(self.error.unwrap_or_else(|| {
            ErrorEnvelope::new(
                ErrorCode::InternalServerError,
                "response carried neither data nor error",
            )
        }))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ProcedureInfo {
    pub path: String,
    pub kind: ProcedureKind,
    pub access: Access,
    pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ListingServer {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct ProcedureListing {
    pub schema_version: u32,
    pub server: ListingServer,
    pub procedures: Vec<ProcedureInfo>,
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn failure_response_has_wire_shape() {
        let response = RpcResponse::failure(ErrorEnvelope::new(
            ErrorCode::Unauthorized,
            "sign in first",
        ));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "ok": false, "error": { "code": "UNAUTHORIZED", "message": "sign in first" } })
        );
        assert_eq!(response.http_status(), 401);
    }

    #[test]
    fn success_keeps_null_data() {
        let response = RpcResponse::success(Value::Null);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "ok": true, "data": null })
        );
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn unrecognized_codes_decode_as_unknown() {
        let envelope: ErrorEnvelope =
            serde_json::from_value(json!({ "code": "TOO_MANY_REQUESTS", "message": "slow down" }))
                .unwrap();
        assert_eq!(envelope.code, ErrorCode::Unknown);
        assert_eq!(envelope.code.http_status(), 500);
    }

    #[test]
    fn call_uses_type_field_and_defaults_input() {
        let call: RpcCall =
            serde_json::from_value(json!({ "path": "exercise.list", "type": "query" })).unwrap();
        assert_eq!(call, RpcCall::query("exercise.list", Value::Null));
    }
}
