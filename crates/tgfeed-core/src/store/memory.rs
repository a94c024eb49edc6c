//! In-memory store. Same contract as [`super::FileStore`] minus durability;
//! used by tests and by `STORAGE_BACKEND=memory`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ChannelStore, MessageStore, StoreError, StoreResult, UserStore, CHANNEL, MESSAGE, USER};
use crate::domain::{Channel, Message, MessageKey, User, UserId};

#[derive(Default)]
pub struct MemoryStore {
    channels: RwLock<BTreeMap<String, Channel>>,
    messages: RwLock<BTreeMap<MessageKey, Message>>,
    users: RwLock<BTreeMap<UserId, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn channel_range(channel_id: &str) -> std::ops::RangeInclusive<MessageKey> {
    MessageKey::new(channel_id, i64::MIN)..=MessageKey::new(channel_id, i64::MAX)
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn save(&self, channel: &Channel) -> StoreResult<()> {
        if channel.id.is_empty() {
            return Err(StoreError::InvalidKey {
                entity: CHANNEL,
                key: channel.id.clone(),
            });
        }
        self.channels
            .write()
            .await
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Channel> {
        self.channels
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(CHANNEL, id))
    }

    async fn list_all(&self) -> StoreResult<Vec<Channel>> {
        Ok(self.channels.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.channels
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(CHANNEL, id))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, message: &Message) -> StoreResult<()> {
        if message.channel_id.is_empty() {
            return Err(StoreError::InvalidKey {
                entity: MESSAGE,
                key: message.key().to_string(),
            });
        }
        self.messages
            .write()
            .await
            .insert(message.key(), message.clone());
        Ok(())
    }

    async fn get(&self, key: &MessageKey) -> StoreResult<Message> {
        self.messages
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(MESSAGE, key))
    }

    async fn list_all(&self) -> StoreResult<Vec<Message>> {
        Ok(self.messages.read().await.values().cloned().collect())
    }

    async fn delete(&self, key: &MessageKey) -> StoreResult<()> {
        self.messages
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(MESSAGE, key))
    }

    async fn list_by_channel(&self, channel_id: &str, limit: usize) -> StoreResult<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .range(channel_range(channel_id))
            .rev()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn list_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .range(channel_range(channel_id))
            .filter(|(_, m)| m.date > since)
            .map(|(_, m)| m.clone())
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn save(&self, user: &User) -> StoreResult<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: UserId) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(USER, id))
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: UserId) -> StoreResult<()> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(USER, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(channel_id: &str, id: i64, date: i64) -> Message {
        Message {
            id,
            channel_id: channel_id.to_string(),
            channel_name: "c".to_string(),
            text: format!("post {id}"),
            author: "Unknown".to_string(),
            date: Utc.timestamp_opt(date, 0).unwrap(),
            link: String::new(),
            media: Vec::new(),
        }
    }

    #[tokio::test]
    async fn list_by_channel_is_scoped_and_newest_first() {
        let store = MemoryStore::new();
        for (cid, id) in [("42", 1), ("42", 3), ("42", 2), ("420", 9), ("4", 8)] {
            MessageStore::save(&store, &message(cid, id, 100)).await.unwrap();
        }
        let ids: Vec<_> = store
            .list_by_channel("42", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let ids: Vec<_> = store
            .list_by_channel("42", 2)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn list_since_filters_by_date() {
        let store = MemoryStore::new();
        MessageStore::save(&store, &message("42", 1, 100)).await.unwrap();
        MessageStore::save(&store, &message("42", 2, 300)).await.unwrap();
        let got = store
            .list_since("42", Utc.timestamp_opt(100, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, 2);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(ChannelStore::delete(&store, "x").await.unwrap_err().is_not_found());
        assert!(MessageStore::delete(&store, &MessageKey::new("x", 1))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(UserStore::delete(&store, UserId(1)).await.unwrap_err().is_not_found());
    }
}
