//! Operation builder
//!
//! Operations are assembled from a [`Procedure`] base: attach middleware with
//! `use_middleware`, optionally declare an input schema with `input`, and
//! finish with `query` or `mutation`.
//!
//! # Example
//!
//! ```rust,ignore
//! use typed_rpc::prelude::*;
//!
//! let public = Procedure::<AppState>::new();
//! let private = public.use_middleware(auth_middleware(ApiKeyResolver));
//!
//! let set_discord_id = private
//!     .input::<SetDiscordIdInput>()
//!     .mutation(|args: HandlerArgs<AppState, SetDiscordIdInput>| async move {
//!         let user = args.ctx.require::<User>("user")?;
//!         args.ctx.store.set_discord_id(&user.id, &args.input.discord_id).await?;
//!         args.json(&SuccessResponse::ok())
//!     });
//! ```
//!
//! Builders are immutable: every call returns a new builder and leaves the
//! receiver as it was, so a base procedure can be shared by many operations.
//!
//! Every operation ends up with the structured writer middleware exactly
//! once. It is appended unless a middleware with the same id is already
//! attached.

use crate::codec::{self, RichValue};
use crate::context::{Context, ContextPatch};
use crate::error::{RpcError, RpcResult};
use crate::middleware::{BoxFuture, Middleware, MiddlewareArgs, OperationKind, RequestInfo};
use crate::validation::{FieldError, Validate};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

/// Content type marking a structured envelope body.
pub const STRUCTURED_CONTENT_TYPE: &str = "application/x-structured+json";

/// Id of the default middleware installing [`StructuredWriter`].
pub const STRUCTURED_WRITER_ID: &str = "structured-writer";

/// Context key the [`StructuredWriter`] is stored under.
pub const STRUCTURED_KEY: &str = "structured";

type ErasedInput = Box<dyn Any + Send>;

type ErasedHandler<S> = Arc<
    dyn Fn(ErasedInput, Context<S>, Arc<RequestInfo>) -> BoxFuture<'static, RpcResult<Reply>>
        + Send
        + Sync,
>;

/// How a reply body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Plain JSON
    Json,
    /// A structured codec envelope
    Structured,
    /// Plain text
    Text,
}

/// A successful response produced by a handler or a middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub format: ReplyFormat,
    pub body: String,
}

impl Reply {
    /// Plain JSON reply with status 200.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> RpcResult<Self> {
        Ok(Self {
            status: StatusCode::OK,
            format: ReplyFormat::Json,
            body: serde_json::to_string(value)?,
        })
    }

    /// Structured envelope reply with status 200.
    pub fn structured(value: &RichValue) -> Self {
        Self {
            status: StatusCode::OK,
            format: ReplyFormat::Structured,
            body: codec::encode(value),
        }
    }

    /// Plain text reply.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            format: ReplyFormat::Text,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn content_type(&self) -> &'static str {
        match self.format {
            ReplyFormat::Json => "application/json",
            ReplyFormat::Structured => STRUCTURED_CONTENT_TYPE,
            ReplyFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let content_type = self.content_type();
        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// Response writer emitting structured envelopes.
///
/// Installed into every request context by the default middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredWriter;

impl StructuredWriter {
    pub fn write(&self, value: impl Into<RichValue>) -> Reply {
        Reply::structured(&value.into())
    }
}

/// The default middleware making [`StructuredWriter`] available.
pub fn structured_writer<S: Send + Sync + 'static>() -> Middleware<S> {
    Middleware::from_fn(STRUCTURED_WRITER_ID, |args: MiddlewareArgs<S>| async move {
        args.next
            .run(ContextPatch::new().insert(STRUCTURED_KEY, StructuredWriter))
            .await
    })
    .provides::<StructuredWriter>(STRUCTURED_KEY)
}

/// Everything a handler receives.
pub struct HandlerArgs<S, I> {
    /// Validated input, `()` for operations without an input schema
    pub input: I,
    /// Context accumulated by the middleware chain
    pub ctx: Context<S>,
    /// The incoming request
    pub request: Arc<RequestInfo>,
}

impl<S, I> HandlerArgs<S, I> {
    /// Reply with plain JSON.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> RpcResult<Reply> {
        Reply::json(value)
    }

    /// Reply with a structured envelope through the context's writer.
    pub fn structured(&self, value: impl Into<RichValue>) -> RpcResult<Reply> {
        Ok(self
            .ctx
            .require::<StructuredWriter>(STRUCTURED_KEY)?
            .write(value))
    }
}

#[derive(Clone, Copy)]
pub(crate) struct InputSchema {
    type_name: &'static str,
    parse: fn(serde_json::Value) -> Result<ErasedInput, Vec<FieldError>>,
}

fn parse_input<I>(value: serde_json::Value) -> Result<ErasedInput, Vec<FieldError>>
where
    I: DeserializeOwned + Validate + Send + 'static,
{
    let input: I = serde_json::from_value(value).map_err(|e| {
        trace!(error = %e, "Input does not match schema");
        vec![FieldError::from_serde(&e)]
    })?;
    let result = input.validate();
    if !result.is_valid() {
        return Err(result.errors);
    }
    Ok(Box::new(input))
}

/// An immutable operation: kind, middleware, optional input schema and
/// handler.
pub struct Operation<S> {
    kind: OperationKind,
    middlewares: Arc<[Middleware<S>]>,
    input: Option<InputSchema>,
    handler: ErasedHandler<S>,
}

impl<S> Clone for Operation<S> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            middlewares: Arc::clone(&self.middlewares),
            input: self.input,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<S> fmt::Debug for Operation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field(
                "middlewares",
                &self.middlewares.iter().map(Middleware::id).collect::<Vec<_>>(),
            )
            .field("input", &self.input_type())
            .finish()
    }
}

impl<S> Operation<S> {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Attached middleware in execution order
    pub fn middlewares(&self) -> &Arc<[Middleware<S>]> {
        &self.middlewares
    }

    /// Rust type name of the input schema, if one was declared
    pub fn input_type(&self) -> Option<&'static str> {
        self.input.map(|schema| schema.type_name)
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Deserialize and validate the decoded input.
    pub(crate) fn parse_input(
        &self,
        value: serde_json::Value,
    ) -> Result<ErasedInput, Vec<FieldError>> {
        match self.input {
            Some(schema) => (schema.parse)(value),
            None => Ok(Box::new(())),
        }
    }

    pub(crate) fn invoke(
        &self,
        input: ErasedInput,
        ctx: Context<S>,
        request: Arc<RequestInfo>,
    ) -> BoxFuture<'static, RpcResult<Reply>> {
        (self.handler)(input, ctx, request)
    }
}

fn assemble<S, I, F, Fut>(
    kind: OperationKind,
    mut middlewares: Vec<Middleware<S>>,
    input: Option<InputSchema>,
    handler: F,
) -> Operation<S>
where
    S: Send + Sync + 'static,
    I: Send + 'static,
    F: Fn(HandlerArgs<S, I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
{
    if !middlewares.iter().any(|m| m.id() == STRUCTURED_WRITER_ID) {
        middlewares.push(structured_writer());
    }

    debug!(
        kind = %kind,
        middleware_count = middlewares.len(),
        input = input.map(|schema| schema.type_name).unwrap_or("none"),
        "Operation assembled"
    );

    let handler: ErasedHandler<S> = Arc::new(
        move |input: ErasedInput,
              ctx: Context<S>,
              request: Arc<RequestInfo>|
              -> BoxFuture<'static, RpcResult<Reply>> {
            match input.downcast::<I>() {
                Ok(input) => Box::pin(handler(HandlerArgs {
                    input: *input,
                    ctx,
                    request,
                })),
                Err(_) => Box::pin(async move {
                    Err(RpcError::internal(format!(
                        "Operation '{}' received input of an unexpected type",
                        request.operation
                    )))
                }),
            }
        },
    );

    Operation {
        kind,
        middlewares: middlewares.into(),
        input,
        handler,
    }
}

/// Base builder for operations.
pub struct Procedure<S> {
    middlewares: Vec<Middleware<S>>,
}

impl<S> Clone for Procedure<S> {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Default for Procedure<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> Procedure<S> {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// A new builder with `middleware` appended.
    #[must_use]
    pub fn use_middleware(&self, middleware: Middleware<S>) -> Self {
        let mut middlewares = self.middlewares.clone();
        middlewares.push(middleware);
        Self { middlewares }
    }

    /// Declare the input schema.
    #[must_use]
    pub fn input<I>(&self) -> InputProcedure<S, I>
    where
        I: DeserializeOwned + Validate + Send + 'static,
    {
        InputProcedure {
            middlewares: self.middlewares.clone(),
            _input: PhantomData,
        }
    }

    /// Finish as a query without input.
    pub fn query<F, Fut>(&self, handler: F) -> Operation<S>
    where
        F: Fn(HandlerArgs<S, ()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
    {
        assemble(OperationKind::Query, self.middlewares.clone(), None, handler)
    }

    /// Finish as a mutation without input.
    pub fn mutation<F, Fut>(&self, handler: F) -> Operation<S>
    where
        F: Fn(HandlerArgs<S, ()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
    {
        assemble(OperationKind::Mutation, self.middlewares.clone(), None, handler)
    }

    /// Attached middleware in order
    pub fn middlewares(&self) -> &[Middleware<S>] {
        &self.middlewares
    }
}

/// Builder with a declared input schema.
pub struct InputProcedure<S, I> {
    middlewares: Vec<Middleware<S>>,
    _input: PhantomData<fn() -> I>,
}

impl<S, I> Clone for InputProcedure<S, I> {
    fn clone(&self) -> Self {
        Self {
            middlewares: self.middlewares.clone(),
            _input: PhantomData,
        }
    }
}

impl<S, I> InputProcedure<S, I>
where
    S: Send + Sync + 'static,
    I: DeserializeOwned + Validate + Send + 'static,
{
    /// A new builder with `middleware` appended.
    #[must_use]
    pub fn use_middleware(&self, middleware: Middleware<S>) -> Self {
        let mut middlewares = self.middlewares.clone();
        middlewares.push(middleware);
        Self {
            middlewares,
            _input: PhantomData,
        }
    }

    fn schema() -> InputSchema {
        InputSchema {
            type_name: std::any::type_name::<I>(),
            parse: parse_input::<I>,
        }
    }

    /// Finish as a query; the input is validated before the handler runs.
    pub fn query<F, Fut>(&self, handler: F) -> Operation<S>
    where
        F: Fn(HandlerArgs<S, I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
    {
        assemble(
            OperationKind::Query,
            self.middlewares.clone(),
            Some(Self::schema()),
            handler,
        )
    }

    /// Finish as a mutation; the input is validated before the handler runs.
    pub fn mutation<F, Fut>(&self, handler: F) -> Operation<S>
    where
        F: Fn(HandlerArgs<S, I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
    {
        assemble(
            OperationKind::Mutation,
            self.middlewares.clone(),
            Some(Self::schema()),
            handler,
        )
    }
}
