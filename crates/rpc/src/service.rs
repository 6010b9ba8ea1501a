use kata_protocol::{ListingServer, ProcedureListing, ProcedurePath, RpcCall, RpcResponse, LISTING_SCHEMA_VERSION};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::context::{new_request_id, ContextBuilder, RequestInfo};
use crate::error::{RpcError, RpcResult};
use crate::middleware::log_call;
use crate::router::Router;
use crate::session::RequestMeta;

/// Entry point for one inbound call: resolve, validate, build context, run the chain.
#[derive(Clone)]
pub struct RpcService {
    router: Arc<Router>,
    contexts: ContextBuilder,
    log_calls: bool,
}

impl RpcService {
    pub fn new(router: Router, contexts: ContextBuilder) -> Self {
        Self {
            router: Arc::new(router),
            contexts,
            log_calls: false,
        }
    }

    /// Logs calls rejected before their chain runs (unknown path, wrong
    /// kind, bad input, session failure). Pair with `Pipeline::with_logging`,
    /// whose link logs every call that reaches the chain.
    pub fn with_call_logging(mut self, enabled: bool) -> Self {
        self.log_calls = enabled;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn listing(&self, name: &str, version: &str) -> ProcedureListing {
        ProcedureListing {
            schema_version: LISTING_SCHEMA_VERSION,
            server: ListingServer {
                name: name.to_string(),
                version: version.to_string(),
            },
            procedures: self.router.describe(),
        }
    }

    pub async fn handle(&self, meta: &RequestMeta, call: RpcCall) -> RpcResponse {
        let request_id = new_request_id();
        let path = call.path.clone();
        let kind = call.kind;
        let started = Instant::now();
        let mut entered_chain = false;
        let result = self
            .dispatch(&request_id, meta, call, &mut entered_chain)
            .await;
        if self.log_calls && !entered_chain {
            log_call(&request_id, kind, &path, "unresolved", &result, started);
        }
        match result {
            Ok(data) => RpcResponse::success(data),
            Err(err) => {
                match &err {
                    RpcError::Internal(source) => {
                        log::error!("rpc id={request_id} path={path} internal error: {source:#}");
                    }
                    RpcError::Rejected { code, message, .. } => {
                        log::debug!("rpc id={request_id} path={path} rejected {code}: {message}");
                    }
                }
                RpcResponse::failure(err.to_envelope())
            }
        }
    }

    async fn dispatch(
        &self,
        request_id: &str,
        meta: &RequestMeta,
        call: RpcCall,
        entered_chain: &mut bool,
    ) -> RpcResult<Value> {
        let RpcCall { path, kind, input } = call;
        let path = ProcedurePath::parse(&path)
            .map_err(|_| RpcError::not_found(format!("No procedure at {path}")))?;
        let procedure = self.router.resolve(&path)?;
        if procedure.kind() != kind {
            return Err(RpcError::bad_request(format!(
                "{path} is a {}, not a {kind}",
                procedure.kind()
            )));
        }

        // Rejected inputs never reach the session collaborator or the database.
        let input = procedure.parse_input(input)?;

        let request = RequestInfo {
            id: request_id.to_string(),
            path,
            kind,
        };
        let ctx = self.contexts.build(meta, request).await?;
        *entered_chain = true;
        procedure.invoke(ctx, input).await
    }
}
