//! Caller identification
//!
//! A bearer API key wins over a session header. A credential that matches no
//! user is treated like a missing one.

use super::store::Store;
use super::types::User;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;
use typed_rpc::{IdentityResolver, RequestInfo, RpcResult, bearer_token};

/// Header carrying an ambient session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Resolves users through the [`Store`].
#[derive(Clone)]
pub struct StoreIdentity {
    store: Arc<dyn Store>,
}

impl StoreIdentity {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityResolver for StoreIdentity {
    type Principal = User;

    async fn resolve(&self, request: &RequestInfo) -> RpcResult<Option<User>> {
        if let Some(api_key) = bearer_token(request) {
            trace!(operation = %request.operation, "Resolving API key");
            return Ok(self.store.user_by_api_key(api_key).await?);
        }
        match request.header(SESSION_HEADER).map(str::trim) {
            Some(session) if !session.is_empty() => {
                trace!(operation = %request.operation, "Resolving session");
                Ok(self.store.user_by_session(session).await?)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::store::MemoryStore;
    use crate::rpc::types::Plan;
    use axum::http::{HeaderMap, HeaderValue, Method};
    use typed_rpc::OperationKind;

    const AUTH: &str = "authorization";

    fn resolver() -> StoreIdentity {
        let store = MemoryStore::new();
        store.insert_user(User::new("u1", "ada@example.com", Plan::Free), "key-1");
        store.insert_user(User::new("u2", "bob@example.com", Plan::Pro), "key-2");
        store.insert_session("s-2", "u2").unwrap();
        StoreIdentity::new(Arc::new(store))
    }

    fn request(headers: &[(&'static str, &'static str)]) -> RequestInfo {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        RequestInfo {
            operation: "project.getUsage".to_string(),
            kind: OperationKind::Query,
            method: Method::GET,
            path: "/api/project/getUsage".to_string(),
            query: None,
            headers: map,
        }
    }

    async fn resolved(headers: &[(&'static str, &'static str)]) -> Option<String> {
        resolver().resolve(&request(headers)).await.unwrap().map(|u| u.id)
    }

    #[tokio::test]
    async fn test_api_key_then_session() {
        assert_eq!(resolved(&[(AUTH, "Bearer key-1")]).await.as_deref(), Some("u1"));
        assert_eq!(resolved(&[(SESSION_HEADER, "s-2")]).await.as_deref(), Some("u2"));
        assert_eq!(
            resolved(&[(AUTH, "Bearer key-1"), (SESSION_HEADER, "s-2")])
                .await
                .as_deref(),
            Some("u1")
        );
    }

    #[tokio::test]
    async fn test_unknown_credentials_are_anonymous() {
        assert_eq!(resolved(&[]).await, None);
        assert_eq!(resolved(&[(AUTH, "Bearer nope")]).await, None);
        assert_eq!(resolved(&[(SESSION_HEADER, "  ")]).await, None);
        // A bad API key does not fall through to the session.
        assert_eq!(
            resolved(&[(AUTH, "Bearer nope"), (SESSION_HEADER, "s-2")]).await,
            None
        );
    }
}
