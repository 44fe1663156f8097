//! The durable key-value store the platform persists options in.
//!
//! The quarantine flag and the unsent queue are the only shared mutable state
//! in this subsystem; both live behind [`KvStore`] using plain get/put
//! semantics, not transactions. Concurrent writers are tolerated because the
//! only coordinated write (quarantine activation) is idempotent.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error encoding or decoding stored value")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("Store in bad state")]
    BadState,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable option storage with plain get/put semantics.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// An in-memory [`KvStore`].
///
/// A correct but unoptimized implementation, suitable for tests and for
/// single-process deployments without an external options store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .values
            .read()
            .map_err(|_| StoreError::BadState)?
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|_| StoreError::BadState)?
            .insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .map_err(|_| StoreError::BadState)?
            .remove(key);
        Ok(())
    }
}
