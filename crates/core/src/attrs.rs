use std::{any::Any, sync::Arc};

use rustc_hash::FxHashMap;
use thiserror::Error;

pub type AttrValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttrError {
    #[error("Attribute '{0}' is not set")]
    Missing(String),

    #[error("Attribute '{key}' is not of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// String-keyed store of shared, type-erased values.
/// Cloning the map shares the values, not copies them.
#[derive(Default, Clone)]
pub struct AttrMap(FxHashMap<String, AttrValue>);

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing (and returning) any previous value.
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Option<AttrValue> {
        self.insert_arc(key, Arc::new(value))
    }

    pub fn insert_arc(&mut self, key: impl Into<String>, value: AttrValue) -> Option<AttrValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get<T: Any>(&self, key: &str) -> Result<&T, AttrError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| AttrError::Missing(key.to_string()))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| AttrError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn get_arc(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = self.0.keys().map(String::as_str).collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for AttrMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}
