//! The application's procedure groups and the service assembled from them.

pub mod admin;
pub mod exercise;
pub mod models;
pub mod submission;
pub mod upload;
pub mod user;

use kata_rpc::{ContextBuilder, DbHandle, Pipeline, Router, RouterError, RpcService};
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::sessions::DbSessions;

/// Every group, mounted under its namespace.
pub fn router(pipeline: &Pipeline, blobs: Arc<dyn BlobStore>) -> Result<Router, RouterError> {
    Router::builder()
        .merge("exercise", exercise::router(pipeline))
        .merge("submission", submission::router(pipeline))
        .merge("user", user::router(pipeline))
        .merge("admin", admin::router(pipeline))
        .merge("upload", upload::router(pipeline, blobs))
        .build()
}

/// `log_calls` installs the per-call logging link and logs calls rejected
/// before the chain (development mode).
pub fn build_service(
    db: DbHandle,
    blobs: Arc<dyn BlobStore>,
    log_calls: bool,
) -> Result<RpcService, RouterError> {
    let pipeline = Pipeline::new().with_logging(log_calls);
    let router = router(&pipeline, blobs)?;
    let sessions = Arc::new(DbSessions::new(db.clone()));
    Ok(RpcService::new(router, ContextBuilder::new(sessions, db)).with_call_logging(log_calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::SignedUrlStore;
    use kata_protocol::ProcedurePath;
    use kata_rpc::MemoryDatabase;
    use std::time::Duration;

    fn service(log_calls: bool) -> RpcService {
        let db: DbHandle = Arc::new(MemoryDatabase::with_tables(models::TABLES));
        let blobs = Arc::new(SignedUrlStore::new("http://blobs", "k", Duration::from_secs(1)));
        build_service(db, blobs, log_calls).unwrap()
    }

    fn links(service: &RpcService, path: &str) -> Vec<&'static str> {
        let path = ProcedurePath::parse(path).unwrap();
        service.router().resolve(&path).unwrap().links().to_vec()
    }

    #[test]
    fn logging_link_is_development_only() {
        let production = service(false);
        assert_eq!(links(&production, "exercise.list"), Vec::<&str>::new());
        assert_eq!(links(&production, "admin.setBanned"), ["auth", "require_admin"]);

        let development = service(true);
        assert_eq!(links(&development, "exercise.list"), ["logging"]);
        assert_eq!(links(&development, "user.me"), ["logging", "auth"]);
    }

    #[test]
    fn every_group_is_mounted() {
        let service = service(false);
        let paths: Vec<String> = service.router().paths().map(ToString::to_string).collect();
        assert!(paths.contains(&"exercise.list".to_string()));
        assert!(paths.contains(&"admin.impersonate".to_string()));
        assert!(paths.contains(&"upload.presign".to_string()));
        assert_eq!(paths.len(), 14);
    }
}
