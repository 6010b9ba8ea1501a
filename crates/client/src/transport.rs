use async_trait::async_trait;
use kata_protocol::{ErrorEnvelope, ProcedureKind, RpcCall, RpcResponse};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Undecodable response (status {status}): {message}")]
    Decode { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

/// Everything a call can fail with, from the caller's point of view.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Rpc(ErrorEnvelope),

    /// Caller bug: a query handed to `QueryCache::mutate`. Nothing was sent.
    #[error("{path} is a {kind}; only mutations go through mutate")]
    NotAMutation { path: String, kind: ProcedureKind },
}

impl ClientError {
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            ClientError::Rpc(envelope) => Some(envelope),
            ClientError::Transport(_) | ClientError::NotAMutation { .. } => None,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: RpcCall) -> std::result::Result<RpcResponse, TransportError>;

    /// Sends and unwraps the `{ ok, data | error }` envelope.
    async fn call(&self, call: RpcCall) -> Result<serde_json::Value> {
        let response = self.send(call).await?;
        response.into_result().map_err(ClientError::Rpc)
    }
}

/// `POST {base_url}/rpc` with an optional bearer token.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn endpoint(&self) -> String {
        format!("{}/rpc", self.base_url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: RpcCall) -> std::result::Result<RpcResponse, TransportError> {
        let mut request = self.client.post(self.endpoint()).json(&call);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        // Error statuses still carry an RPC envelope.
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode {
            status,
            message: err.to_string(),
        })
    }
}
