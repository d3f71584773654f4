//! Application state shared by every request

use super::store::Store;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use typed_rpc::EnvelopeCache;

/// How long a user's category list stays cached.
pub const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Cached category lists kept at most.
pub const CATEGORY_CACHE_CAPACITY: usize = 1024;

/// Application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    /// Data access
    pub store: Arc<dyn Store>,
    /// Category lists by user
    pub cache: EnvelopeCache,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: EnvelopeCache::new(
                NonZeroUsize::new(CATEGORY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("cache", &self.cache).finish_non_exhaustive()
    }
}

/// Cache id of a user's category list.
pub fn categories_cache_id(user_id: &str) -> String {
    format!("user_event_categories:{}", user_id)
}
