//! Interceptor chain.
//!
//! A chain is built once per procedure, at registration, by folding the
//! declared middleware list from the right over the terminal handler. Each
//! [`Middleware`] receives the context and a [`Next`] continuation; it may
//! pass the (possibly replaced) context on, reject without calling `next`, or
//! wrap the result for cross-cutting effects. The first declared middleware is
//! the outermost layer, so pre-`next` code runs in declaration order and
//! post-`next` code runs in reverse.

use async_trait::async_trait;
use kata_protocol::ProcedureKind;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::context::{AuthenticatedContext, CallContext, PublicContext};
use crate::error::{RpcError, RpcResult};

/// Validated procedure input, opaque to middleware.
pub struct Input(Box<dyn Any + Send>);

impl Input {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn take<T: 'static>(self) -> RpcResult<T> {
        self.0
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| RpcError::internal("procedure input type mismatch"))
    }
}

#[async_trait]
pub trait Endpoint<C: Send + 'static>: Send + Sync {
    async fn call(&self, ctx: C, input: Input) -> RpcResult<Value>;
}

/// Continuation handed to a middleware: the rest of the chain.
pub struct Next<'a, C: Send + 'static> {
    inner: &'a dyn Endpoint<C>,
    input: Input,
    passed: &'a AtomicBool,
}

impl<'a, C: Send + 'static> Next<'a, C> {
    pub async fn run(self, ctx: C) -> RpcResult<Value> {
        self.passed.store(true, Ordering::Relaxed);
        self.inner.call(ctx, self.input).await
    }
}

#[async_trait]
pub trait Middleware<C: Send + 'static>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: C, next: Next<'_, C>) -> RpcResult<Value>;
}

/// Terminal state of one link for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Control flowed to the next link or the handler.
    Passed,
    /// Returned to the caller without calling `next`.
    ShortCircuited,
}

struct Layer<C: Send + 'static> {
    middleware: Arc<dyn Middleware<C>>,
    inner: Arc<dyn Endpoint<C>>,
}

#[async_trait]
impl<C: CallContext> Endpoint<C> for Layer<C> {
    async fn call(&self, ctx: C, input: Input) -> RpcResult<Value> {
        let request_id = ctx.request().id.clone();
        let passed = AtomicBool::new(false);
        let next = Next {
            inner: self.inner.as_ref(),
            input,
            passed: &passed,
        };
        let result = self.middleware.handle(ctx, next).await;
        let outcome = if passed.load(Ordering::Relaxed) {
            LinkOutcome::Passed
        } else {
            LinkOutcome::ShortCircuited
        };
        log::trace!(
            "rpc id={request_id} link={} outcome={outcome:?}",
            self.middleware.name()
        );
        result
    }
}

/// Fold-right: `[a, b]` over `h` becomes `a(b(h))`.
pub fn compose<C: CallContext>(
    middlewares: &[Arc<dyn Middleware<C>>],
    terminal: Arc<dyn Endpoint<C>>,
) -> Arc<dyn Endpoint<C>> {
    middlewares.iter().rev().fold(terminal, |inner, middleware| {
        Arc::new(Layer {
            middleware: middleware.clone(),
            inner,
        }) as Arc<dyn Endpoint<C>>
    })
}

/// Auth link: narrows [`PublicContext`] to [`AuthenticatedContext`] or rejects.
pub struct AuthGate {
    inner: Arc<dyn Endpoint<AuthenticatedContext>>,
}

impl AuthGate {
    pub fn new(inner: Arc<dyn Endpoint<AuthenticatedContext>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Endpoint<PublicContext> for AuthGate {
    async fn call(&self, ctx: PublicContext, input: Input) -> RpcResult<Value> {
        let request_id = ctx.request.id.clone();
        match ctx.into_authenticated() {
            Ok(ctx) => {
                log::trace!("rpc id={request_id} link=auth outcome=Passed");
                self.inner.call(ctx, input).await
            }
            Err(err) => {
                log::trace!("rpc id={request_id} link=auth outcome=ShortCircuited");
                Err(err)
            }
        }
    }
}

pub struct RequireAdmin;

#[async_trait]
impl Middleware<AuthenticatedContext> for RequireAdmin {
    fn name(&self) -> &'static str {
        "require_admin"
    }

    async fn handle(
        &self,
        ctx: AuthenticatedContext,
        next: Next<'_, AuthenticatedContext>,
    ) -> RpcResult<Value> {
        if !ctx.session.user.is_admin() {
            return Err(RpcError::forbidden("Administrator access required"));
        }
        next.run(ctx).await
    }
}

/// One `info` line per call: correlation id, procedure, caller, outcome, duration.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware<PublicContext> for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, ctx: PublicContext, next: Next<'_, PublicContext>) -> RpcResult<Value> {
        let started = Instant::now();
        let request = ctx.request.clone();
        let caller = ctx
            .session
            .user
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), |u| u.id.clone());

        let result = next.run(ctx).await;

        log_call(
            &request.id,
            request.kind,
            &request.path.to_string(),
            &caller,
            &result,
            started,
        );
        result
    }
}

pub(crate) fn log_call(
    id: &str,
    kind: ProcedureKind,
    path: &str,
    caller: &str,
    result: &RpcResult<Value>,
    started: Instant,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.code().as_str(),
    };
    log::info!(
        "rpc id={id} kind={kind} path={path} caller={caller} outcome={outcome} duration_ms={}",
        started.elapsed().as_millis()
    );
}
