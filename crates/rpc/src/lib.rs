//! Typed procedure pipeline.
//!
//! An inbound [`kata_protocol::RpcCall`] is resolved by the [`Router`], its
//! input validated, a [`PublicContext`] built from the session collaborator
//! and the shared database handle, and the procedure's middleware chain run
//! down to the handler. Protected procedures narrow the context to an
//! [`AuthenticatedContext`] on the way.

pub mod context;
pub mod db;
pub mod error;
pub mod middleware;
pub mod procedure;
pub mod router;
pub mod service;
pub mod session;
pub mod validate;

pub use context::{new_request_id, AuthenticatedContext, CallContext, ContextBuilder, PublicContext, RequestInfo};
pub use db::{from_row, to_row, Database, DatabaseError, DbHandle, DbResult, Filter, MemoryDatabase, Row};
pub use error::{FieldIssue, RpcError, RpcResult};
pub use middleware::{compose, Endpoint, Input, LinkOutcome, LoggingMiddleware, Middleware, Next, RequireAdmin};
pub use procedure::{Pipeline, Procedure, ProcedureBuilder};
pub use router::{Router, RouterBuilder, RouterError};
pub use service::RpcService;
pub use session::{AuthenticatedSession, FixedSession, RequestMeta, Role, Session, SessionProvider, SessionUser};
pub use validate::{Issues, Validate};
