//! Middleware chain
//!
//! Middleware runs strictly in the order it was attached. Each one receives
//! the context accumulated so far, the request and a [`Next`] continuation.
//! Calling [`Next::run`] merges the middleware's contribution into the
//! context and runs the rest of the chain; returning without calling it
//! short-circuits the request.
//!
//! # Example
//!
//! ```rust,ignore
//! let tenant = Middleware::from_fn("tenant", |args: MiddlewareArgs<AppState>| async move {
//!     let tenant = args.request.header("x-tenant").unwrap_or("default").to_string();
//!     args.next.run(ContextPatch::new().insert("tenant", tenant)).await
//! })
//! .provides::<String>("tenant");
//! ```
//!
//! A middleware may only contribute the keys it declares with
//! [`Middleware::provides`]; anything else is rejected when the request runs.

use crate::context::{Context, ContextKey, ContextPatch};
use crate::error::{RpcError, RpcResult};
use crate::procedure::Reply;
use axum::http::{HeaderMap, Method};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::trace;

/// Boxed future returned by middleware and handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type MiddlewareBody<S> = Arc<dyn Fn(MiddlewareArgs<S>) -> BoxFuture<'static, RpcResult<Reply>> + Send + Sync>;

/// Continuation invoked once the whole chain has run.
pub(crate) type Terminal<S> = Box<dyn FnOnce(Context<S>) -> BoxFuture<'static, RpcResult<Reply>> + Send>;

/// Kind of operation being called
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read-only operation, served over GET
    Query,
    /// Write operation, served over POST
    Mutation,
}

impl OperationKind {
    /// HTTP verb the operation is served with.
    pub fn method(&self) -> Method {
        match self {
            Self::Query => Method::GET,
            Self::Mutation => Method::POST,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request information passed to middleware and handlers
#[derive(Clone, Debug)]
pub struct RequestInfo {
    /// Dotted operation name (e.g., "project.getUsage")
    pub operation: String,
    /// Kind of operation
    pub kind: OperationKind,
    /// HTTP method of the request
    pub method: Method,
    /// Request path
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
    /// Request headers
    pub headers: HeaderMap,
}

impl RequestInfo {
    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Get the namespace (first part of the operation name)
    pub fn namespace(&self) -> Option<&str> {
        self.operation
            .split_once('.')
            .map(|(namespace, _)| namespace)
    }
}

/// Arguments handed to a middleware body.
pub struct MiddlewareArgs<S> {
    /// Context accumulated by the middleware before this one
    pub ctx: Context<S>,
    /// Continuation running the rest of the chain
    pub next: Next<S>,
    /// The incoming request
    pub request: Arc<RequestInfo>,
}

/// A named middleware with the context keys it may contribute.
pub struct Middleware<S> {
    id: Arc<str>,
    provides: Vec<ContextKey>,
    body: MiddlewareBody<S>,
}

impl<S> Clone for Middleware<S> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            provides: self.provides.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<S> fmt::Debug for Middleware<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("id", &self.id)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}

impl<S: Send + Sync + 'static> Middleware<S> {
    /// Create middleware from an async function.
    ///
    /// `id` identifies the middleware; two middlewares with the same id are
    /// treated as equivalent when an operation is assembled.
    pub fn from_fn<F, Fut>(id: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(MiddlewareArgs<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Reply>> + Send + 'static,
    {
        Self {
            id: id.into(),
            provides: Vec::new(),
            body: Arc::new(move |args| -> BoxFuture<'static, RpcResult<Reply>> {
                Box::pin(f(args))
            }),
        }
    }
}

impl<S> Middleware<S> {
    /// Declare a context value this middleware contributes.
    #[must_use]
    pub fn provides<T: std::any::Any>(mut self, key: impl Into<String>) -> Self {
        self.provides.push(ContextKey::of::<T>(key));
        self
    }

    /// Stable identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Context keys this middleware may contribute
    pub fn provided_keys(&self) -> &[ContextKey] {
        &self.provides
    }

    fn check_patch(&self, patch: &ContextPatch) -> RpcResult<()> {
        for (key, slot) in patch.entries() {
            let declared = self
                .provides
                .iter()
                .find(|declared| declared.name() == key.as_str());
            match declared {
                Some(declared) if declared.type_id() == slot.type_id() => {}
                Some(declared) => {
                    return Err(RpcError::internal(format!(
                        "Middleware '{}' contributed {} under '{}', declared as {}",
                        self.id,
                        slot.type_name(),
                        key,
                        declared.type_name()
                    )));
                }
                None => {
                    return Err(RpcError::internal(format!(
                        "Middleware '{}' contributed undeclared context value '{}'",
                        self.id, key
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The rest of the chain after the current middleware.
///
/// `run` takes `self`, so the continuation is invoked at most once.
pub struct Next<S> {
    chain: Arc<[Middleware<S>]>,
    position: usize,
    ctx: Context<S>,
    request: Arc<RequestInfo>,
    terminal: Terminal<S>,
}

impl<S: Send + Sync + 'static> Next<S> {
    /// Merge `patch` into the context and run the remaining chain.
    pub async fn run(self, patch: ContextPatch) -> RpcResult<Reply> {
        let Self {
            chain,
            position,
            ctx,
            request,
            terminal,
        } = self;

        if let Some(current) = chain.get(position) {
            current.check_patch(&patch)?;
        }
        let ctx = ctx.merged(patch);
        dispatch(chain, position + 1, ctx, request, terminal).await
    }

    /// Run the remaining chain without contributing anything.
    pub async fn proceed(self) -> RpcResult<Reply> {
        self.run(ContextPatch::new()).await
    }
}

/// Run `chain` from the first middleware, finishing with `terminal`.
pub(crate) fn execute_chain<S: Send + Sync + 'static>(
    chain: Arc<[Middleware<S>]>,
    ctx: Context<S>,
    request: Arc<RequestInfo>,
    terminal: Terminal<S>,
) -> BoxFuture<'static, RpcResult<Reply>> {
    dispatch(chain, 0, ctx, request, terminal)
}

fn dispatch<S: Send + Sync + 'static>(
    chain: Arc<[Middleware<S>]>,
    position: usize,
    ctx: Context<S>,
    request: Arc<RequestInfo>,
    terminal: Terminal<S>,
) -> BoxFuture<'static, RpcResult<Reply>> {
    let Some(middleware) = chain.get(position).cloned() else {
        trace!(operation = %request.operation, "Middleware chain complete");
        return terminal(ctx);
    };

    trace!(
        operation = %request.operation,
        middleware = %middleware.id,
        position,
        "Entering middleware"
    );
    let next = Next {
        chain,
        position,
        ctx: ctx.clone(),
        request: Arc::clone(&request),
        terminal,
    };
    (middleware.body)(MiddlewareArgs { ctx, next, request })
}
