//! Data access
//!
//! Handlers only see the [`Store`] trait. [`MemoryStore`] keeps everything in
//! concurrent maps and is what the binary and the tests run against.

use super::types::{EventCategory, NewCategory, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, trace};
use typed_rpc::RpcError;

/// Failure of a data-access call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user '{0}' does not exist")]
    UnknownUser(String),

    #[error("category '{name}' already exists")]
    DuplicateCategory { name: String },

    #[error("category '{name}' does not exist")]
    UnknownCategory { name: String },

    #[error("category limit of {limit} reached")]
    CategoryLimit { limit: usize },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateCategory { name } => {
                RpcError::conflict(format!("A category named '{}' already exists", name))
            }
            StoreError::UnknownCategory { name } => {
                RpcError::not_found(format!("Category '{}' not found", name))
            }
            StoreError::CategoryLimit { limit } => RpcError::forbidden(format!(
                "Category limit of {} reached, upgrade your plan to create more",
                limit
            )),
            other => RpcError::unknown(other),
        }
    }
}

/// Record-oriented access to users, categories and events.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn user_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>>;

    async fn user_by_session(&self, session_id: &str) -> StoreResult<Option<User>>;

    async fn set_discord_id(&self, user_id: &str, discord_id: &str) -> StoreResult<()>;

    /// Categories of a user, oldest first.
    async fn categories(&self, user_id: &str) -> StoreResult<Vec<EventCategory>>;

    async fn category_count(&self, user_id: &str) -> StoreResult<usize>;

    /// Create a category unless the user already holds `limit` of them.
    /// The count and the insert are one atomic step.
    async fn create_category(
        &self,
        user_id: &str,
        new: NewCategory,
        limit: usize,
    ) -> StoreResult<EventCategory>;

    /// Delete by name. Returns whether a category was removed.
    async fn delete_category(&self, user_id: &str, name: &str) -> StoreResult<bool>;

    async fn record_event(&self, user_id: &str, category: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Events recorded at or after `since`.
    async fn events_since(&self, user_id: &str, since: DateTime<Utc>) -> StoreResult<u64>;
}

/// In-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    api_keys: DashMap<String, String>,
    sessions: DashMap<String, String>,
    categories: DashMap<String, Vec<EventCategory>>,
    events: DashMap<String, Vec<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user reachable through `api_key`.
    pub fn insert_user(&self, user: User, api_key: impl Into<String>) {
        self.api_keys.insert(api_key.into(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    /// Open a session for an existing user.
    pub fn insert_session(&self, session_id: impl Into<String>, user_id: &str) -> StoreResult<()> {
        self.ensure_user(user_id)?;
        self.sessions.insert(session_id.into(), user_id.to_string());
        Ok(())
    }

    fn ensure_user(&self, user_id: &str) -> StoreResult<()> {
        if self.users.contains_key(user_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownUser(user_id.to_string()))
        }
    }

    fn user_by_index(&self, index: &DashMap<String, String>, key: &str) -> Option<User> {
        let user_id = index.get(key)?.value().clone();
        self.users.get(&user_id).map(|user| user.value().clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_api_key(&self, api_key: &str) -> StoreResult<Option<User>> {
        Ok(self.user_by_index(&self.api_keys, api_key))
    }

    async fn user_by_session(&self, session_id: &str) -> StoreResult<Option<User>> {
        Ok(self.user_by_index(&self.sessions, session_id))
    }

    async fn set_discord_id(&self, user_id: &str, discord_id: &str) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))?;
        user.discord_id = Some(discord_id.to_string());
        debug!(user_id = %user_id, "Discord id updated");
        Ok(())
    }

    async fn categories(&self, user_id: &str) -> StoreResult<Vec<EventCategory>> {
        Ok(self
            .categories
            .get(user_id)
            .map(|list| list.value().clone())
            .unwrap_or_default())
    }

    async fn category_count(&self, user_id: &str) -> StoreResult<usize> {
        Ok(self.categories.get(user_id).map_or(0, |list| list.len()))
    }

    async fn create_category(
        &self,
        user_id: &str,
        new: NewCategory,
        limit: usize,
    ) -> StoreResult<EventCategory> {
        self.ensure_user(user_id)?;
        // The entry guard locks this user's list until the push
        let mut list = self.categories.entry(user_id.to_string()).or_default();
        if list.len() >= limit {
            return Err(StoreError::CategoryLimit { limit });
        }
        if list.iter().any(|c| c.name == new.name) {
            return Err(StoreError::DuplicateCategory { name: new.name });
        }

        let category = EventCategory {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            name: new.name,
            color: new.color,
            emoji: new.emoji,
            created_at: Utc::now(),
            events_count: 0,
        };
        list.push(category.clone());
        debug!(user_id = %user_id, category = %category.name, "Category created");
        Ok(category)
    }

    async fn delete_category(&self, user_id: &str, name: &str) -> StoreResult<bool> {
        let Some(mut list) = self.categories.get_mut(user_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|c| c.name != name);
        let removed = list.len() < before;
        if removed {
            debug!(user_id = %user_id, category = %name, "Category deleted");
        }
        Ok(removed)
    }

    async fn record_event(&self, user_id: &str, category: &str, at: DateTime<Utc>) -> StoreResult<()> {
        {
            let mut list = self
                .categories
                .get_mut(user_id)
                .ok_or_else(|| StoreError::UnknownCategory { name: category.to_string() })?;
            let entry = list
                .iter_mut()
                .find(|c| c.name == category)
                .ok_or_else(|| StoreError::UnknownCategory { name: category.to_string() })?;
            entry.events_count += 1;
        }
        self.events.entry(user_id.to_string()).or_default().push(at);
        trace!(user_id = %user_id, category = %category, "Event recorded");
        Ok(())
    }

    async fn events_since(&self, user_id: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.events.get(user_id).map_or(0, |events| {
            events.iter().filter(|at| **at >= since).count() as u64
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::Plan;
    use chrono::Duration;
    use std::sync::Arc;

    const LIMIT: usize = 3;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_user(User::new("u1", "ada@example.com", Plan::Free), "key-1");
        store
    }

    fn sales() -> NewCategory {
        NewCategory {
            name: "sales".into(),
            color: "#ff6b6b".into(),
            emoji: Some("💰".into()),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_key_and_session() {
        let store = store();
        store.insert_session("s-1", "u1").unwrap();

        assert_eq!(store.user_by_api_key("key-1").await.unwrap().unwrap().id, "u1");
        assert_eq!(store.user_by_session("s-1").await.unwrap().unwrap().id, "u1");
        assert!(store.user_by_api_key("key-2").await.unwrap().is_none());
        assert!(matches!(
            store.insert_session("s-2", "ghost"),
            Err(StoreError::UnknownUser(_))
        ));
    }

    #[tokio::test]
    async fn test_category_lifecycle() {
        let store = store();
        let created = store.create_category("u1", sales(), LIMIT).await.unwrap();
        assert_eq!(created.events_count, 0);
        assert_eq!(store.category_count("u1").await.unwrap(), 1);

        assert!(matches!(
            store.create_category("u1", sales(), LIMIT).await,
            Err(StoreError::DuplicateCategory { .. })
        ));

        store.record_event("u1", "sales", Utc::now()).await.unwrap();
        assert_eq!(store.categories("u1").await.unwrap()[0].events_count, 1);

        assert!(store.delete_category("u1", "sales").await.unwrap());
        assert!(!store.delete_category("u1", "sales").await.unwrap());
        assert_eq!(store.category_count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_events_since() {
        let store = store();
        store.create_category("u1", sales(), LIMIT).await.unwrap();
        let now = Utc::now();
        store.record_event("u1", "sales", now - Duration::days(40)).await.unwrap();
        store.record_event("u1", "sales", now).await.unwrap();

        assert_eq!(store.events_since("u1", now - Duration::days(1)).await.unwrap(), 1);
        assert_eq!(store.events_since("u1", now - Duration::days(60)).await.unwrap(), 2);
        assert_eq!(store.events_since("nobody", now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let store = store();
        assert!(matches!(
            store.set_discord_id("ghost", "123").await,
            Err(StoreError::UnknownUser(_))
        ));
        assert!(matches!(
            store.create_category("ghost", sales(), LIMIT).await,
            Err(StoreError::UnknownUser(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_the_limit() {
        let store = Arc::new(store());
        store.create_category("u1", sales(), LIMIT).await.unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let new = NewCategory {
                        name: format!("category {}", i),
                        color: "#00ff00".into(),
                        emoji: None,
                    };
                    store.create_category("u1", new, LIMIT).await
                })
            })
            .collect();

        let mut refused = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => {}
                Err(StoreError::CategoryLimit { limit }) => {
                    assert_eq!(limit, LIMIT);
                    refused += 1;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(refused, 16 - (LIMIT - 1));
        assert_eq!(store.category_count("u1").await.unwrap(), LIMIT);
    }

    #[test]
    fn test_store_errors_map_to_rpc_errors() {
        let conflict = RpcError::from(StoreError::DuplicateCategory { name: "sales".into() });
        assert_eq!(conflict.status().as_u16(), 409);

        let missing = RpcError::from(StoreError::UnknownCategory { name: "sales".into() });
        assert_eq!(missing.status().as_u16(), 404);

        let limited = RpcError::from(StoreError::CategoryLimit { limit: 3 });
        assert_eq!(limited.status().as_u16(), 403);

        let down = RpcError::from(StoreError::Unavailable("connection reset".into()));
        assert_eq!(down.status().as_u16(), 500);
        assert_eq!(down.error_type(), typed_rpc::ErrorType::UnknownError);
    }
}
