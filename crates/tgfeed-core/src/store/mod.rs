//! Entity Store: persistence ports for channels, messages and users.
//!
//! Each entity type has its own port with the same shape (upsert, keyed get,
//! best-effort listing, delete). Backends serialize writers per entity type
//! and allow concurrent readers; nothing is transactional across types.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{Channel, Message, MessageKey, User, UserId};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const CHANNEL: &str = "channel";
pub const MESSAGE: &str = "message";
pub const USER: &str = "user";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid {entity} key: {key:?}")]
    InvalidKey { entity: &'static str, key: String },

    #[error("storage i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {}: {source}", .path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Upsert by `channel.id`.
    async fn save(&self, channel: &Channel) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Channel>;
    /// All readable channels, in no particular order. Unreadable records are skipped.
    async fn list_all(&self) -> StoreResult<Vec<Channel>>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Upsert by `(channel_id, id)`.
    async fn save(&self, message: &Message) -> StoreResult<()>;
    async fn get(&self, key: &MessageKey) -> StoreResult<Message>;
    async fn list_all(&self) -> StoreResult<Vec<Message>>;
    async fn delete(&self, key: &MessageKey) -> StoreResult<()>;

    /// Up to `limit` messages of a channel with the highest sequence ids,
    /// newest first.
    async fn list_by_channel(&self, channel_id: &str, limit: usize) -> StoreResult<Vec<Message>>;

    /// Every message of a channel dated strictly after `since`, oldest id first.
    async fn list_since(&self, channel_id: &str, since: DateTime<Utc>)
        -> StoreResult<Vec<Message>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn save(&self, user: &User) -> StoreResult<()>;
    async fn get(&self, id: UserId) -> StoreResult<User>;
    async fn list_all(&self) -> StoreResult<Vec<User>>;
    async fn delete(&self, id: UserId) -> StoreResult<()>;
}

/// Which backend [`Stores::open`] builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
}

/// One handle per entity port, shared by every component.
#[derive(Clone)]
pub struct Stores {
    pub channels: Arc<dyn ChannelStore>,
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserStore>,
    channel_edits: Arc<Mutex<()>>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: ChannelStore + MessageStore + UserStore + 'static,
    {
        Self {
            channels: backend.clone(),
            messages: backend.clone(),
            users: backend,
            channel_edits: Arc::new(Mutex::new(())),
        }
    }

    /// Serializes channel read-modify-write cycles across clones of this
    /// bundle. Hold the guard from the `get` through the `save`.
    pub async fn lock_channel_edits(&self) -> MutexGuard<'_, ()> {
        self.channel_edits.lock().await
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    pub async fn open(backend: StorageBackend, root: impl Into<PathBuf>) -> StoreResult<Self> {
        match backend {
            StorageBackend::File => Ok(Self::from_backend(Arc::new(FileStore::open(root).await?))),
            StorageBackend::Memory => Ok(Self::memory()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn channel_edit_lock_is_shared_between_clones() {
        let stores = Stores::memory();
        let other = stores.clone();

        let guard = stores.lock_channel_edits().await;
        let blocked = tokio::time::timeout(Duration::from_millis(10), other.lock_channel_edits());
        assert!(blocked.await.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(10), other.lock_channel_edits());
        assert!(acquired.await.is_ok());
    }
}
