//! Session state persistence
//!
//! The layer only needs an external key-value store with expiry and
//! atomic per-key read/write. [`SessionStore`] is that port;
//! [`MemorySessionStore`] is the in-process adapter and
//! [`StateRepository`] adds typed encode/decode on top.

mod memory;
mod repository;

pub use memory::MemorySessionStore;
pub use repository::{LoadOutcome, StateRepository};

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::utils::error::DialogueError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DialogueError>;
    async fn set_ex(&self, key: &str, ttl: Duration, value: Bytes) -> Result<(), DialogueError>;
    async fn delete(&self, key: &str) -> Result<(), DialogueError>;
}
