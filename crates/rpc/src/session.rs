use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub banned: bool,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Session as seen by public procedures; `user` is absent for anonymous calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<SessionUser>,
}

/// Session of a signed-in caller. Only the auth link constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub user: SessionUser,
}

/// Transport-level facts the session collaborator needs.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub bearer_token: Option<String>,
}

impl RequestMeta {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }

    /// Accepts only `Bearer <token>`; anything else is treated as anonymous.
    pub fn from_authorization_header(value: Option<&str>) -> Self {
        let bearer_token = value
            .map(str::trim)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self { bearer_token }
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_server_session(&self, request: &RequestMeta) -> Result<Option<SessionUser>>;
}

/// Resolves every request to the same session.
#[derive(Debug, Clone, Default)]
pub struct FixedSession(pub Option<SessionUser>);

#[async_trait]
impl SessionProvider for FixedSession {
    async fn get_server_session(&self, _request: &RequestMeta) -> Result<Option<SessionUser>> {
        Ok(self.0.clone())
    }
}
