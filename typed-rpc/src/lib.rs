//! # Typed RPC
//!
//! Typed operations compiled to HTTP routes, with a structured value codec
//! and a client that needs no per-operation code.
//!
//! ## Overview
//!
//! - **Operation builder**: queries and mutations with an optional input
//!   schema and layered middleware
//! - **Middleware chain**: onion-model execution where each middleware can
//!   contribute typed values to the request context
//! - **Router compiler**: every operation becomes an `axum` route, GET for
//!   queries and POST for mutations, with one error envelope for every failure
//! - **Structured codec**: dates, maps, sets, `undefined`, non-finite numbers
//!   and big integers survive the trip over JSON
//! - **Call-dispatch client**: `client.at("project").at("getUsage")` resolves
//!   to the same path the compiler registered
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Client                                                      │
//! │  at("ns").at("op") ──► route_path ──► fetch (GET) / send (POST)
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │ HTTP, codec-encoded fields
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  CompiledRouter (axum)                                       │
//! │  decode ─► validate ─► middleware chain ─► handler ─► reply   │
//! │                 │              │              │              │
//! │                 └──────────────┴──────────────┴─► error envelope
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use typed_rpc::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct SetDiscordId {
//!     #[serde(rename = "discordId")]
//!     discord_id: String,
//! }
//!
//! impl Validate for SetDiscordId {
//!     fn validate(&self) -> ValidationResult {
//!         ValidationRules::new()
//!             .max_chars("discordId", &self.discord_id, 20)
//!             .build()
//!     }
//! }
//!
//! let public = Procedure::<AppState>::new()
//!     .use_middleware(logging_middleware(LogConfig::default()));
//! let private = public.use_middleware(auth_middleware(resolver));
//!
//! let project = Router::new()
//!     .operation("getUsage", private.query(|args| async move {
//!         let user = args.ctx.require::<User>(USER_KEY)?;
//!         args.structured(usage_of(user))
//!     }))
//!     .operation("setDiscordID", private.input::<SetDiscordId>().mutation(|args| async move {
//!         args.ctx.store.set_discord_id(&args.input.discord_id).await?;
//!         args.json(&json!({ "success": true }))
//!     }));
//!
//! let compiled = Router::new()
//!     .merge("project", project)
//!     .compile(state, RpcConfig::default())?;
//!
//! axum::serve(listener, compiled.into_axum()).await?;
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod procedure;
pub mod router;
pub mod validation;

#[cfg(test)]
mod tests;

// Public API
pub use auth::{IdentityResolver, USER_KEY, auth_middleware, bearer_token};
pub use cache::{CacheStats, EnvelopeCache};
pub use client::{Client, ClientError, Route};
pub use codec::{CodecError, FieldDecode, RichValue, decode, decode_field, decode_lenient, encode};
pub use config::{ConfigValidationError, RpcConfig};
pub use context::{Context, ContextKey, ContextPatch};
pub use error::{ErrorBody, ErrorConfig, ErrorType, RpcError, RpcErrorCode, RpcResult};
pub use logging::{LogConfig, REQUEST_ID_KEY, RequestId, logging_middleware};
pub use middleware::{BoxFuture, Middleware, MiddlewareArgs, Next, OperationKind, RequestInfo};
pub use procedure::{
    HandlerArgs, InputProcedure, Operation, Procedure, Reply, ReplyFormat, StructuredWriter,
};
pub use router::{CompileError, CompiledRouter, RequestStage, RouteEntry, Router, route_path};
pub use validation::{FieldError, Validate, ValidationResult, ValidationRules};

/// Prelude for convenient imports
///
/// ```rust,ignore
/// use typed_rpc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Collaborators
        EnvelopeCache,
        IdentityResolver,
        USER_KEY,
        auth_middleware,
        bearer_token,
        // Client
        Client,
        ClientError,
        // Codec
        RichValue,
        // Router
        CompiledRouter,
        Router,
        RpcConfig,
        // Context
        Context,
        ContextPatch,
        // Errors
        RpcError,
        RpcErrorCode,
        RpcResult,
        // Logging
        LogConfig,
        REQUEST_ID_KEY,
        RequestId,
        logging_middleware,
        // Middleware
        Middleware,
        MiddlewareArgs,
        Next,
        RequestInfo,
        // Operations
        HandlerArgs,
        Procedure,
        Reply,
        // Validation
        FieldError,
        Validate,
        ValidationResult,
        ValidationRules,
    };
}
