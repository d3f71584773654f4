//! Request context
//!
//! A [`Context`] pairs the shared application state with the values the
//! middleware chain has contributed so far for one request. It derefs to the
//! application state, so handlers reach their collaborators directly:
//!
//! ```rust,ignore
//! let categories = ctx.store.list_categories(&user.id).await?;
//! let user = ctx.require::<User>("user")?;
//! ```
//!
//! Values are keyed by name and checked against the Rust type they were
//! inserted with. Merging a [`ContextPatch`] never touches the receiver; a
//! later value under the same key shadows the earlier one.

use crate::error::{RpcError, RpcResult};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A context key together with the Rust type stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKey {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
}

impl ContextKey {
    /// Declare that `name` holds a `T`.
    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }
}

#[derive(Clone)]
pub(crate) struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Slot {
    fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Values contributed by one middleware.
#[derive(Clone, Default)]
pub struct ContextPatch {
    entries: Vec<(String, Slot)>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `key`.
    #[must_use]
    pub fn insert<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.entries.push((key.into(), Slot::new(value)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub(crate) fn entries(&self) -> &[(String, Slot)] {
        &self.entries
    }
}

impl fmt::Debug for ContextPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, slot)| (k, slot.type_name)))
            .finish()
    }
}

/// Accumulated context of one request.
///
/// Cloning is cheap; the state and the value map are reference counted.
pub struct Context<S> {
    state: Arc<S>,
    values: Arc<BTreeMap<String, Slot>>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            values: Arc::clone(&self.values),
        }
    }
}

impl<S> Context<S> {
    /// A context holding only the application state.
    pub fn new(state: Arc<S>) -> Self {
        Self {
            state,
            values: Arc::new(BTreeMap::new()),
        }
    }

    /// The shared application state.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Value under `key`, if present with type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.value.downcast_ref::<T>()
    }

    /// Value under `key`, or an internal error naming the missing key.
    ///
    /// A missing key means the operation was built without the middleware
    /// that provides it, which is a programming error rather than a client
    /// error.
    pub fn require<T: Any>(&self, key: &str) -> RpcResult<&T> {
        match self.values.get(key) {
            None => Err(RpcError::internal(format!(
                "Context value '{}' is not available",
                key
            ))),
            Some(slot) => slot.value.downcast_ref::<T>().ok_or_else(|| {
                RpcError::internal(format!(
                    "Context value '{}' holds {}, not {}",
                    key,
                    slot.type_name,
                    std::any::type_name::<T>()
                ))
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Names of all contributed values.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// A new context with `patch` merged on top of this one.
    pub fn merged(&self, patch: ContextPatch) -> Self {
        if patch.is_empty() {
            return self.clone();
        }
        let mut values = (*self.values).clone();
        for (key, slot) in patch.entries {
            values.insert(key, slot);
        }
        Self {
            state: Arc::clone(&self.state),
            values: Arc::new(values),
        }
    }
}

impl<S> std::ops::Deref for Context<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<S> fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(k, slot)| (k, slot.type_name)))
            .finish()
    }
}
