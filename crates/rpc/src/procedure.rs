//! Procedure definitions and the builders that bind them to a middleware stack.

use async_trait::async_trait;
use kata_protocol::{Access, ProcedureKind};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::{AuthenticatedContext, CallContext, PublicContext};
use crate::error::{RpcError, RpcResult};
use crate::middleware::{compose, AuthGate, Endpoint, Input, LoggingMiddleware, Middleware, RequireAdmin};
use crate::validate::{parse_input, Validate};

type ParseFn = fn(Value) -> RpcResult<Input>;

/// A registered endpoint. Immutable once built.
#[derive(Clone)]
pub struct Procedure {
    kind: ProcedureKind,
    access: Access,
    parse: ParseFn,
    input_schema: Value,
    links: Vec<&'static str>,
    endpoint: Arc<dyn Endpoint<PublicContext>>,
}

impl Procedure {
    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Middleware names in execution order, outermost first.
    pub fn links(&self) -> &[&'static str] {
        &self.links
    }

    /// Structural and rule validation. Runs before any context is built.
    pub fn parse_input(&self, raw: Value) -> RpcResult<Input> {
        (self.parse)(raw)
    }

    /// Runs the chain on a dedicated task so a panic becomes an internal
    /// error and the effect completes even if the caller goes away.
    pub async fn invoke(&self, ctx: PublicContext, input: Input) -> RpcResult<Value> {
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move { endpoint.call(ctx, input).await })
            .await
            .map_err(|join| RpcError::internal(format!("procedure task failed: {join}")))?
    }
}

fn erase<I>(raw: Value) -> RpcResult<Input>
where
    I: DeserializeOwned + Validate + Send + 'static,
{
    parse_input::<I>(raw).map(Input::new)
}

struct HandlerEndpoint<F, I, O> {
    handler: F,
    _marker: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<C, I, O, F, Fut> Endpoint<C> for HandlerEndpoint<F, I, O>
where
    C: CallContext,
    I: Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(C, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<O>> + Send + 'static,
{
    async fn call(&self, ctx: C, input: Input) -> RpcResult<Value> {
        let input: I = input.take()?;
        let output = (self.handler)(ctx, input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Middleware stacks shared by every procedure built from it.
#[derive(Clone, Default)]
pub struct Pipeline {
    public: Vec<Arc<dyn Middleware<PublicContext>>>,
    authenticated: Vec<Arc<dyn Middleware<AuthenticatedContext>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Development stack: per-call logging outermost.
    pub fn with_logging(self, enabled: bool) -> Self {
        if enabled {
            self.with(LoggingMiddleware)
        } else {
            self
        }
    }

    /// Adds a link that runs for every procedure, before auth.
    pub fn with(mut self, middleware: impl Middleware<PublicContext> + 'static) -> Self {
        self.public.push(Arc::new(middleware));
        self
    }

    /// Adds a link that runs for protected and admin procedures, after auth.
    pub fn with_authenticated(
        mut self,
        middleware: impl Middleware<AuthenticatedContext> + 'static,
    ) -> Self {
        self.authenticated.push(Arc::new(middleware));
        self
    }

    pub fn public(&self) -> ProcedureBuilder<PublicContext> {
        ProcedureBuilder::new(self.clone(), Access::Public, Vec::new())
    }

    pub fn protected(&self) -> ProcedureBuilder<AuthenticatedContext> {
        ProcedureBuilder::new(self.clone(), Access::Protected, Vec::new())
    }

    pub fn admin(&self) -> ProcedureBuilder<AuthenticatedContext> {
        ProcedureBuilder::new(
            self.clone(),
            Access::Admin,
            vec![Arc::new(RequireAdmin) as Arc<dyn Middleware<AuthenticatedContext>>],
        )
    }
}

/// Context types a handler may be written against.
pub trait HandlerContext: CallContext + Sized {
    fn seal(
        pipeline: &Pipeline,
        extra: &[Arc<dyn Middleware<Self>>],
        terminal: Arc<dyn Endpoint<Self>>,
    ) -> Arc<dyn Endpoint<PublicContext>>;

    fn link_names(pipeline: &Pipeline, extra: &[Arc<dyn Middleware<Self>>]) -> Vec<&'static str>;
}

impl HandlerContext for PublicContext {
    fn seal(
        pipeline: &Pipeline,
        extra: &[Arc<dyn Middleware<Self>>],
        terminal: Arc<dyn Endpoint<Self>>,
    ) -> Arc<dyn Endpoint<PublicContext>> {
        let links: Vec<_> = pipeline.public.iter().chain(extra).cloned().collect();
        compose(&links, terminal)
    }

    fn link_names(pipeline: &Pipeline, extra: &[Arc<dyn Middleware<Self>>]) -> Vec<&'static str> {
        pipeline.public.iter().chain(extra).map(|m| m.name()).collect()
    }
}

impl HandlerContext for AuthenticatedContext {
    fn seal(
        pipeline: &Pipeline,
        extra: &[Arc<dyn Middleware<Self>>],
        terminal: Arc<dyn Endpoint<Self>>,
    ) -> Arc<dyn Endpoint<PublicContext>> {
        let links: Vec<_> = pipeline
            .authenticated
            .iter()
            .chain(extra)
            .cloned()
            .collect();
        let inner = compose(&links, terminal);
        compose(&pipeline.public, Arc::new(AuthGate::new(inner)))
    }

    fn link_names(pipeline: &Pipeline, extra: &[Arc<dyn Middleware<Self>>]) -> Vec<&'static str> {
        let public = pipeline.public.iter().map(|m| m.name());
        let authenticated = pipeline.authenticated.iter().chain(extra).map(|m| m.name());
        public.chain(["auth"]).chain(authenticated).collect()
    }
}

pub struct ProcedureBuilder<C: HandlerContext> {
    pipeline: Pipeline,
    access: Access,
    extra: Vec<Arc<dyn Middleware<C>>>,
}

impl<C: HandlerContext> ProcedureBuilder<C> {
    fn new(pipeline: Pipeline, access: Access, extra: Vec<Arc<dyn Middleware<C>>>) -> Self {
        Self {
            pipeline,
            access,
            extra,
        }
    }

    /// Appends a procedure-specific link, innermost so far.
    pub fn with(mut self, middleware: impl Middleware<C> + 'static) -> Self {
        self.extra.push(Arc::new(middleware));
        self
    }

    pub fn query<I, O, F, Fut>(self, handler: F) -> Procedure
    where
        I: DeserializeOwned + Validate + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.build(ProcedureKind::Query, handler)
    }

    pub fn mutation<I, O, F, Fut>(self, handler: F) -> Procedure
    where
        I: DeserializeOwned + Validate + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.build(ProcedureKind::Mutation, handler)
    }

    fn build<I, O, F, Fut>(self, kind: ProcedureKind, handler: F) -> Procedure
    where
        I: DeserializeOwned + Validate + JsonSchema + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(C, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        let terminal: Arc<dyn Endpoint<C>> = Arc::new(HandlerEndpoint {
            handler,
            _marker: PhantomData::<fn(I) -> O>,
        });
        let input_schema = serde_json::to_value(schemars::schema_for!(I)).unwrap_or_default();
        Procedure {
            kind,
            access: self.access,
            parse: erase::<I>,
            input_schema,
            links: C::link_names(&self.pipeline, &self.extra),
            endpoint: C::seal(&self.pipeline, &self.extra, terminal),
        }
    }
}
