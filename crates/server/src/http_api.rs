use axum::{
    body::{Body, Bytes},
    extract::Query,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE, WWW_AUTHENTICATE},
        HeaderMap, Response as HttpResponse, StatusCode,
    },
    response::Response,
    routing::get,
    Router,
};
use kata_protocol::{serialize_json, ErrorCode, ErrorEnvelope, RpcCall, RpcResponse};
use kata_rpc::{RequestMeta, RpcService};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::SupportedLocales;
use crate::locale::{locale_reply, LocaleQuery};

pub(crate) struct HttpState {
    pub service: RpcService,
    pub locales: SupportedLocales,
}

pub(crate) fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route(
            "/rpc",
            get({
                let state = state.clone();
                move || listing_handler(state.clone())
            })
            .post({
                let state = state.clone();
                move |headers, body| rpc_handler(headers, body, state.clone())
            }),
        )
        .route(
            "/health",
            get({
                let state = state.clone();
                move || health_handler(state.clone())
            }),
        )
        .route(
            "/api/locale",
            get({
                let state = state.clone();
                move |query| locale_handler(query, state.clone())
            }),
        )
}

async fn rpc_handler(
    headers: HeaderMap,
    body: Bytes,
    state: Arc<HttpState>,
) -> Result<Response, StatusCode> {
    let call: RpcCall = match serde_json::from_slice(&body) {
        Ok(call) => call,
        Err(err) => {
            let response = RpcResponse::failure(ErrorEnvelope::new(
                ErrorCode::BadRequest,
                format!("Invalid JSON request: {err}"),
            ));
            return build_response(StatusCode::BAD_REQUEST, &response, None);
        }
    };
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let meta = RequestMeta::from_authorization_header(authorization);
    let response = state.service.handle(&meta, call).await;
    let status =
        StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    build_response(status, &response, None)
}

async fn listing_handler(state: Arc<HttpState>) -> Result<Response, StatusCode> {
    let listing = state
        .service
        .listing(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    build_response(StatusCode::OK, &listing, None)
}

async fn health_handler(state: Arc<HttpState>) -> Result<Response, StatusCode> {
    let body = json!({ "status": "ok", "procedures": state.service.router().len() });
    build_response(StatusCode::OK, &body, None)
}

async fn locale_handler(
    Query(query): Query<LocaleQuery>,
    state: Arc<HttpState>,
) -> Result<Response, StatusCode> {
    let reply = locale_reply(&query, &state.locales);
    build_response(reply.status, &reply.body, reply.set_cookie.as_deref())
}

pub(crate) fn build_response<T: Serialize>(
    status: StatusCode,
    body: &T,
    set_cookie: Option<&str>,
) -> Result<Response, StatusCode> {
    let bytes = serialize_json(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_bytes();

    let mut builder = HttpResponse::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json");

    if status == StatusCode::UNAUTHORIZED {
        builder = builder.header(WWW_AUTHENTICATE, "Bearer");
    }
    if let Some(cookie) = set_cookie {
        builder = builder.header(SET_COOKIE, cookie);
    }

    builder
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
