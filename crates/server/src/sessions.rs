//! Session collaborator backed by the `sessions` and `users` tables.

use anyhow::Result;
use async_trait::async_trait;
use kata_rpc::{from_row, to_row, DbHandle, Filter, RequestMeta, SessionProvider, SessionUser};

use crate::app::models::{SessionRecord, SESSIONS, USERS};
use crate::server_security::{new_session_token, token_digest};

pub struct DbSessions {
    db: DbHandle,
}

impl DbSessions {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionProvider for DbSessions {
    async fn get_server_session(&self, request: &RequestMeta) -> Result<Option<SessionUser>> {
        let Some(token) = request.bearer_token.as_deref() else {
            return Ok(None);
        };
        let filter = Filter::all().eq("tokenDigest", token_digest(token));
        let Some(row) = self.db.find_one(SESSIONS, &filter).await? else {
            return Ok(None);
        };
        let session: SessionRecord = from_row(row)?;
        match self.db.find_one(USERS, &Filter::by_id(&session.user_id)).await? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => {
                log::warn!("session {} points at missing user {}", session.id, session.user_id);
                Ok(None)
            }
        }
    }
}

/// Creates a session row for `user_id` and returns the bearer token.
pub async fn issue_session(
    db: &DbHandle,
    user_id: &str,
    impersonated_by: Option<String>,
) -> Result<String> {
    let token = new_session_token()?;
    let record = SessionRecord {
        id: String::new(),
        token_digest: token_digest(&token),
        user_id: user_id.to_string(),
        impersonated_by,
    };
    db.insert(SESSIONS, to_row(&record)?).await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::TABLES;
    use kata_rpc::{MemoryDatabase, Role};
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_issued_tokens_only() {
        let db: DbHandle = Arc::new(MemoryDatabase::with_tables(TABLES));
        let user = SessionUser {
            id: "u1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: Role::User,
            banned: false,
        };
        db.insert(USERS, to_row(&user).unwrap()).await.unwrap();
        let token = issue_session(&db, "u1", None).await.unwrap();

        let sessions = DbSessions::new(db.clone());
        let found = sessions
            .get_server_session(&RequestMeta::with_token(token))
            .await
            .unwrap();
        assert_eq!(found, Some(user));

        let nobody = sessions
            .get_server_session(&RequestMeta::with_token("forged"))
            .await
            .unwrap();
        assert!(nobody.is_none());
        assert!(sessions
            .get_server_session(&RequestMeta::anonymous())
            .await
            .unwrap()
            .is_none());
    }
}
