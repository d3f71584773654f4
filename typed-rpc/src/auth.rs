//! Identity collaborator boundary
//!
//! The core does not know how callers are identified. An application plugs
//! in an [`IdentityResolver`]; [`auth_middleware`] runs it for every request,
//! contributes the resolved principal under [`USER_KEY`] and rejects the
//! request with 401 when nothing resolves. Handlers behind the middleware read
//! the principal with `ctx.require::<P>(USER_KEY)`.
//!
//! # Example
//!
//! ```rust,ignore
//! use typed_rpc::auth::{IdentityResolver, auth_middleware, bearer_token};
//!
//! struct ApiKeys(Arc<dyn Store>);
//!
//! #[async_trait]
//! impl IdentityResolver for ApiKeys {
//!     type Principal = User;
//!
//!     async fn resolve(&self, request: &RequestInfo) -> RpcResult<Option<User>> {
//!         match bearer_token(request) {
//!             Some(key) => self.0.user_by_api_key(key).await.map_err(RpcError::unknown),
//!             None => Ok(None),
//!         }
//!     }
//! }
//!
//! let private = Procedure::new().use_middleware(auth_middleware(ApiKeys(store)));
//! ```

use crate::context::ContextPatch;
use crate::error::{RpcError, RpcResult};
use crate::middleware::{Middleware, MiddlewareArgs, RequestInfo};
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use std::sync::Arc;
use tracing::debug;

/// Context key the resolved principal is stored under.
pub const USER_KEY: &str = "user";

/// Id of the middleware built by [`auth_middleware`].
pub const AUTH_MIDDLEWARE_ID: &str = "auth";

/// Message of the 401 returned when no principal resolves.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Resolves the caller of a request.
///
/// Returning `Ok(None)` means the caller is anonymous. Failures of the
/// underlying identity provider are returned as errors and surface through
/// the error boundary; they are not treated as absence.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// The resolved caller
    type Principal: Clone + Send + Sync + 'static;

    async fn resolve(&self, request: &RequestInfo) -> RpcResult<Option<Self::Principal>>;
}

/// Middleware requiring an identity.
pub fn auth_middleware<S, R>(resolver: R) -> Middleware<S>
where
    S: Send + Sync + 'static,
    R: IdentityResolver,
{
    let resolver = Arc::new(resolver);
    Middleware::from_fn(AUTH_MIDDLEWARE_ID, move |args: MiddlewareArgs<S>| {
        let resolver = Arc::clone(&resolver);
        async move {
            match resolver.resolve(&args.request).await? {
                Some(principal) => {
                    args.next
                        .run(ContextPatch::new().insert(USER_KEY, principal))
                        .await
                }
                None => {
                    debug!(operation = %args.request.operation, "No identity resolved");
                    Err(RpcError::unauthorized(UNAUTHORIZED_MESSAGE))
                }
            }
        }
    })
    .provides::<R::Principal>(USER_KEY)
}

/// Credential of an `Authorization: Bearer <token>` header.
pub fn bearer_token(request: &RequestInfo) -> Option<&str> {
    let value = request.header(AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::OperationKind;
    use axum::http::{HeaderMap, HeaderValue, Method};

    fn request(authorization: Option<&'static str>) -> RequestInfo {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        }
        RequestInfo {
            operation: "project.getUsage".to_string(),
            kind: OperationKind::Query,
            method: Method::GET,
            path: "/api/project/getUsage".to_string(),
            query: None,
            headers,
        }
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&request(Some("Bearer key-123"))), Some("key-123"));
        assert_eq!(bearer_token(&request(Some("bearer key-123"))), Some("key-123"));
        assert_eq!(bearer_token(&request(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&request(Some("Bearer "))), None);
        assert_eq!(bearer_token(&request(None)), None);
    }

    struct Fixed(Option<String>);

    #[async_trait]
    impl IdentityResolver for Fixed {
        type Principal = String;

        async fn resolve(&self, _request: &RequestInfo) -> RpcResult<Option<String>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_resolver_contract() {
        let req = request(None);
        assert_eq!(
            Fixed(Some("user_1".into())).resolve(&req).await.unwrap(),
            Some("user_1".to_string())
        );
        assert_eq!(Fixed(None).resolve(&req).await.unwrap(), None);
    }

    #[test]
    fn test_middleware_declares_principal() {
        let middleware = auth_middleware::<(), _>(Fixed(None));
        assert_eq!(middleware.id(), AUTH_MIDDLEWARE_ID);
        let key = &middleware.provided_keys()[0];
        assert_eq!(key.name(), USER_KEY);
        assert_eq!(key.type_name(), std::any::type_name::<String>());
    }
}
