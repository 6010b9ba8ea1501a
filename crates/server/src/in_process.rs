use async_trait::async_trait;
use kata_client::{Transport, TransportError};
use kata_protocol::{RpcCall, RpcResponse};
use kata_rpc::{RequestMeta, RpcService};
use std::sync::Arc;

/// Calls the service directly, skipping HTTP. Used by tests and by
/// server-side rendering paths that share the process.
#[derive(Clone)]
pub struct InProcessTransport {
    service: Arc<RpcService>,
    meta: RequestMeta,
}

impl InProcessTransport {
    pub fn new(service: Arc<RpcService>) -> Self {
        Self {
            service,
            meta: RequestMeta::anonymous(),
        }
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.meta.bearer_token = token;
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, call: RpcCall) -> Result<RpcResponse, TransportError> {
        Ok(self.service.handle(&self.meta, call).await)
    }
}
