//! Router compiler
//!
//! A [`Router`] is a mapping from dotted operation names to operations.
//! Compiling it produces one HTTP route per operation: queries are served
//! over GET and mutations over POST, at the path [`route_path`] derives from
//! the name.
//!
//! # Example
//!
//! ```rust,ignore
//! use typed_rpc::prelude::*;
//!
//! let router = Router::new()
//!     .operation("health", health)
//!     .merge("project", Router::new()
//!         .operation("getUsage", get_usage)
//!         .operation("setDiscordID", set_discord_id));
//!
//! let compiled = router.compile(AppState::new(store), RpcConfig::default())?;
//! assert_eq!(compiled.route("project.getUsage").unwrap().path, "/api/project/getUsage");
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3210").await?;
//! axum::serve(listener, compiled.into_axum()).await?;
//! ```
//!
//! The route table is built once and never changes; requests only read it.

mod pipeline;

pub use pipeline::RequestStage;

use crate::config::{ConfigValidationError, RpcConfig};
use crate::context::ContextKey;
use crate::error::RpcError;
use crate::logging::{log_route_registered, log_router_compiled};
use crate::middleware::OperationKind;
use crate::procedure::Operation;
use crate::validation::validate_operation_name;
use axum::extract::Request;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use axum::routing::{MethodRouter, get, post};
use pipeline::{Endpoint, PipelineSettings};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceExt;
use tracing::debug;

/// Path of the route serving an operation.
///
/// Shared by the compiler and the client, so both always agree.
///
/// ```rust,ignore
/// assert_eq!(route_path("/api", &["project", "getUsage"]), "/api/project/getUsage");
/// assert_eq!(route_path("/", &["health"]), "/health");
/// ```
pub fn route_path<T: AsRef<str>>(base_path: &str, segments: &[T]) -> String {
    let mut path = base_path.trim_end_matches('/').to_string();
    for segment in segments {
        path.push('/');
        path.push_str(segment.as_ref());
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Failure to compile a router.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("invalid operation name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("operation '{0}' is registered more than once")]
    Duplicate(String),

    #[error(
        "operation '{operation}': context key '{key}' is declared as {first} by '{first_by}' and as {second} by '{second_by}'"
    )]
    ConflictingContextKey {
        operation: String,
        key: String,
        first: &'static str,
        first_by: String,
        second: &'static str,
        second_by: String,
    },
}

/// One compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Dotted operation name
    pub name: String,
    /// Route path, including the base path
    pub path: String,
    /// GET for queries, POST for mutations
    pub method: Method,
    pub kind: OperationKind,
}

/// Named operations waiting to be compiled.
pub struct Router<S> {
    operations: Vec<(String, Operation<S>)>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
        }
    }
}

impl<S> fmt::Debug for Router<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("operations", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl<S> Router<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under `name`.
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>, operation: Operation<S>) -> Self {
        self.operations.push((name.into(), operation));
        self
    }

    /// Nest every operation of `other` under `namespace`.
    #[must_use]
    pub fn merge(mut self, namespace: &str, other: Router<S>) -> Self {
        for (name, operation) in other.operations {
            let name = if namespace.is_empty() {
                name
            } else {
                format!("{}.{}", namespace, name)
            };
            self.operations.push((name, operation));
        }
        self
    }

    /// Registered operation names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl<S: Send + Sync + 'static> Router<S> {
    /// Compile into HTTP routes.
    ///
    /// `state` is the application state every request shares read-only.
    pub fn compile(
        self,
        state: impl Into<Arc<S>>,
        config: RpcConfig,
    ) -> Result<CompiledRouter, CompileError> {
        config.validate()?;

        let state = state.into();
        let settings = Arc::new(PipelineSettings::from(&config));
        let errors = config.error_config();

        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(self.operations.len());
        let mut service = axum::Router::new();

        for (name, operation) in self.operations {
            validate_operation_name(&name).map_err(|reason| CompileError::InvalidName {
                name: name.clone(),
                reason,
            })?;
            if !seen.insert(name.clone()) {
                return Err(CompileError::Duplicate(name));
            }
            check_context_keys(&name, &operation)?;

            let segments: Vec<&str> = name.split('.').collect();
            let path = route_path(&config.base_path, &segments);
            let kind = operation.kind();

            let endpoint = Arc::new(Endpoint::new(
                &name,
                operation,
                Arc::clone(&state),
                Arc::clone(&settings),
            ));
            let method_router = endpoint_route(endpoint, kind).fallback(move |method: Method| async move {
                RpcError::http(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("{} is not supported on this route", method),
                )
                .into_response_with(&errors)
            });
            service = service.route(&path, method_router);

            log_route_registered(&name, &kind.method(), &path);
            routes.push(RouteEntry {
                name,
                path,
                method: kind.method(),
                kind,
            });
        }

        service = service.fallback(move |uri: Uri| async move {
            RpcError::route_not_found(uri.path()).into_response_with(&errors)
        });

        log_router_compiled(routes.len(), &config.base_path);
        Ok(CompiledRouter {
            routes: routes.into(),
            service,
        })
    }
}

fn endpoint_route<S: Send + Sync + 'static>(
    endpoint: Arc<Endpoint<S>>,
    kind: OperationKind,
) -> MethodRouter {
    let handler = move |request: Request| {
        let endpoint = Arc::clone(&endpoint);
        async move { endpoint.serve(request).await }
    };
    match kind {
        OperationKind::Query => get(handler),
        OperationKind::Mutation => post(handler),
    }
}

/// Reject operations whose middleware disagree on the type of a context key.
fn check_context_keys<S>(name: &str, operation: &Operation<S>) -> Result<(), CompileError> {
    let mut declared: HashMap<&str, (&ContextKey, &str)> = HashMap::new();
    for middleware in operation.middlewares().iter() {
        for key in middleware.provided_keys() {
            match declared.entry(key.name()) {
                Entry::Occupied(entry) => {
                    let (first, first_by) = *entry.get();
                    if first.type_id() != key.type_id() {
                        return Err(CompileError::ConflictingContextKey {
                            operation: name.to_string(),
                            key: key.name().to_string(),
                            first: first.type_name(),
                            first_by: first_by.to_string(),
                            second: key.type_name(),
                            second_by: middleware.id().to_string(),
                        });
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert((key, middleware.id()));
                }
            }
        }
    }
    debug!(operation = %name, keys = declared.len(), "Context keys checked");
    Ok(())
}

/// The compiled, immutable route table and its HTTP service.
#[derive(Clone)]
pub struct CompiledRouter {
    routes: Arc<[RouteEntry]>,
    service: axum::Router,
}

impl fmt::Debug for CompiledRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRouter")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl CompiledRouter {
    /// Every compiled route in registration order
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Route of one operation
    pub fn route(&self, name: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// The HTTP service, ready for `axum::serve` or further layering.
    pub fn into_axum(self) -> axum::Router {
        self.service
    }

    /// Serve a single request in-process.
    pub async fn handle(&self, request: Request) -> Response {
        match self.service.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}
