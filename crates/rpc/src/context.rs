use getrandom::getrandom;
use kata_protocol::{ProcedureKind, ProcedurePath};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::DbHandle;
use crate::error::{RpcError, RpcResult};
use crate::session::{AuthenticatedSession, RequestMeta, Session, SessionProvider};

/// Identity of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: String,
    pub path: ProcedurePath,
    pub kind: ProcedureKind,
}

/// Implemented by every context type so links can tag their output.
pub trait CallContext: Send + 'static {
    fn request(&self) -> &RequestInfo;
}

#[derive(Clone)]
pub struct PublicContext {
    pub request: RequestInfo,
    pub session: Session,
    pub db: DbHandle,
}

#[derive(Clone)]
pub struct AuthenticatedContext {
    pub request: RequestInfo,
    pub session: AuthenticatedSession,
    pub db: DbHandle,
}

impl PublicContext {
    /// Narrows to an authenticated context, rejecting anonymous and banned callers.
    pub fn into_authenticated(self) -> RpcResult<AuthenticatedContext> {
        let Some(user) = self.session.user else {
            return Err(RpcError::unauthorized("You must be signed in"));
        };
        if user.banned {
            return Err(RpcError::banned("This account has been banned"));
        }
        Ok(AuthenticatedContext {
            request: self.request,
            session: AuthenticatedSession { user },
            db: self.db,
        })
    }
}

impl CallContext for PublicContext {
    fn request(&self) -> &RequestInfo {
        &self.request
    }
}

impl CallContext for AuthenticatedContext {
    fn request(&self) -> &RequestInfo {
        &self.request
    }
}

/// Builds the per-request context from the session collaborator and the shared db handle.
#[derive(Clone)]
pub struct ContextBuilder {
    sessions: Arc<dyn SessionProvider>,
    db: DbHandle,
}

impl ContextBuilder {
    pub fn new(sessions: Arc<dyn SessionProvider>, db: DbHandle) -> Self {
        Self { sessions, db }
    }

    pub async fn build(&self, meta: &RequestMeta, request: RequestInfo) -> RpcResult<PublicContext> {
        let user = self
            .sessions
            .get_server_session(meta)
            .await
            .map_err(|err| RpcError::Internal(err.context("session lookup failed")))?;
        Ok(PublicContext {
            request,
            session: Session { user },
            db: self.db.clone(),
        })
    }
}

static FALLBACK_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// 16 hex chars; falls back to a process counter when the OS RNG is unavailable.
pub fn new_request_id() -> String {
    let mut bytes = [0u8; 8];
    let value = match getrandom(&mut bytes) {
        Ok(()) => u64::from_be_bytes(bytes),
        Err(_) => FALLBACK_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
    };
    format!("{value:016x}")
}
