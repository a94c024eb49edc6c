//! File-backed store: one pretty-printed JSON record per entity.
//!
//! Layout under the root directory:
//! - `channels/{id}.json`
//! - `messages/{channel_id}/{message_id}.json`
//! - `users/{id}.json`
//!
//! Records are written to a sibling `*.json.tmp` file and renamed into place.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, sync::RwLock};
use tracing::warn;

use super::{
    ChannelStore, MessageStore, StoreError, StoreResult, UserStore, CHANNEL, MESSAGE, USER,
};
use crate::domain::{Channel, Message, MessageKey, User, UserId};

const CHANNELS_DIR: &str = "channels";
const MESSAGES_DIR: &str = "messages";
const USERS_DIR: &str = "users";
const EXT: &str = "json";

pub struct FileStore {
    root: PathBuf,
    channels_lock: RwLock<()>,
    messages_lock: RwLock<()>,
    users_lock: RwLock<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [CHANNELS_DIR, MESSAGES_DIR, USERS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).await.map_err(io_err(&path))?;
        }
        Ok(Self {
            root,
            channels_lock: RwLock::new(()),
            messages_lock: RwLock::new(()),
            users_lock: RwLock::new(()),
        })
    }

    fn channel_path(&self, id: &str) -> Option<PathBuf> {
        valid_key(id).then(|| self.root.join(CHANNELS_DIR).join(format!("{id}.{EXT}")))
    }

    fn message_dir(&self, channel_id: &str) -> Option<PathBuf> {
        valid_key(channel_id).then(|| self.root.join(MESSAGES_DIR).join(channel_id))
    }

    fn message_path(&self, key: &MessageKey) -> Option<PathBuf> {
        self.message_dir(&key.channel_id)
            .map(|dir| dir.join(format!("{}.{EXT}", key.id)))
    }

    fn user_path(&self, id: UserId) -> PathBuf {
        self.root.join(USERS_DIR).join(format!("{id}.{EXT}"))
    }
}

#[async_trait]
impl ChannelStore for FileStore {
    async fn save(&self, channel: &Channel) -> StoreResult<()> {
        let path = self
            .channel_path(&channel.id)
            .ok_or_else(|| invalid_key(CHANNEL, &channel.id))?;
        let _guard = self.channels_lock.write().await;
        write_json(&path, channel).await
    }

    async fn get(&self, id: &str) -> StoreResult<Channel> {
        let path = self
            .channel_path(id)
            .ok_or_else(|| StoreError::not_found(CHANNEL, id))?;
        let _guard = self.channels_lock.read().await;
        read_json(&path, CHANNEL, id).await
    }

    async fn list_all(&self) -> StoreResult<Vec<Channel>> {
        let _guard = self.channels_lock.read().await;
        let files = json_files(&self.root.join(CHANNELS_DIR)).await?;
        Ok(load_lenient(files).await)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let path = self
            .channel_path(id)
            .ok_or_else(|| StoreError::not_found(CHANNEL, id))?;
        let _guard = self.channels_lock.write().await;
        remove(&path, CHANNEL, id).await
    }
}

#[async_trait]
impl MessageStore for FileStore {
    async fn save(&self, message: &Message) -> StoreResult<()> {
        let key = message.key();
        let path = self
            .message_path(&key)
            .ok_or_else(|| invalid_key(MESSAGE, &key))?;
        let _guard = self.messages_lock.write().await;
        write_json(&path, message).await
    }

    async fn get(&self, key: &MessageKey) -> StoreResult<Message> {
        let path = self
            .message_path(key)
            .ok_or_else(|| StoreError::not_found(MESSAGE, key))?;
        let _guard = self.messages_lock.read().await;
        read_json(&path, MESSAGE, &key.to_string()).await
    }

    async fn list_all(&self) -> StoreResult<Vec<Message>> {
        let _guard = self.messages_lock.read().await;
        let mut out = Vec::new();
        for dir in subdirs(&self.root.join(MESSAGES_DIR)).await? {
            let files = json_files(&dir).await?;
            out.extend(load_lenient::<Message>(files).await);
        }
        Ok(out)
    }

    async fn delete(&self, key: &MessageKey) -> StoreResult<()> {
        let path = self
            .message_path(key)
            .ok_or_else(|| StoreError::not_found(MESSAGE, key))?;
        let _guard = self.messages_lock.write().await;
        remove(&path, MESSAGE, &key.to_string()).await
    }

    async fn list_by_channel(&self, channel_id: &str, limit: usize) -> StoreResult<Vec<Message>> {
        let Some(dir) = self.message_dir(channel_id) else {
            return Ok(Vec::new());
        };
        let _guard = self.messages_lock.read().await;

        let mut files = message_files(&dir).await?;
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut out = Vec::with_capacity(limit.min(files.len()));
        for (_, path) in files {
            if out.len() >= limit {
                break;
            }
            match read_record::<Message>(&path).await {
                Ok(m) => out.push(m),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(out)
    }

    async fn list_since(
        &self,
        channel_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Message>> {
        let Some(dir) = self.message_dir(channel_id) else {
            return Ok(Vec::new());
        };
        let _guard = self.messages_lock.read().await;

        let files = message_files(&dir).await?;
        let mut out: Vec<Message> = load_lenient(files.into_iter().map(|(_, p)| p))
            .await
            .into_iter()
            .filter(|m: &Message| m.date > since)
            .collect();
        out.sort_by_key(|m| m.id);
        Ok(out)
    }
}

#[async_trait]
impl UserStore for FileStore {
    async fn save(&self, user: &User) -> StoreResult<()> {
        let path = self.user_path(user.id);
        let _guard = self.users_lock.write().await;
        write_json(&path, user).await
    }

    async fn get(&self, id: UserId) -> StoreResult<User> {
        let path = self.user_path(id);
        let _guard = self.users_lock.read().await;
        read_json(&path, USER, &id.to_string()).await
    }

    async fn list_all(&self) -> StoreResult<Vec<User>> {
        let _guard = self.users_lock.read().await;
        let files = json_files(&self.root.join(USERS_DIR)).await?;
        Ok(load_lenient(files).await)
    }

    async fn delete(&self, id: UserId) -> StoreResult<()> {
        let path = self.user_path(id);
        let _guard = self.users_lock.write().await;
        remove(&path, USER, &id.to_string()).await
    }
}

// === helpers ===

/// Keys become file names, so anything that could escape the entity directory is refused.
fn valid_key(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\\', '\0'])
}

fn invalid_key(entity: &'static str, key: &impl ToString) -> StoreError {
    StoreError::InvalidKey {
        entity,
        key: key.to_string(),
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> StoreResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let tmp = path.with_extension(format!("{EXT}.tmp"));
    fs::write(&tmp, &data).await.map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).await.map_err(io_err(path))?;
    Ok(())
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let data = fs::read(path).await.map_err(io_err(path))?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

async fn read_json<T: DeserializeOwned>(
    path: &Path,
    entity: &'static str,
    key: &str,
) -> StoreResult<T> {
    match read_record(path).await {
        Err(StoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            Err(StoreError::not_found(entity, key))
        }
        other => other,
    }
}

async fn remove(path: &Path, entity: &'static str, key: &str) -> StoreResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::not_found(entity, key)),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `*.json` files directly inside `dir`, sorted by name. A missing directory is empty.
async fn json_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(io_err(dir))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXT) {
            continue;
        }
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => out.push(path),
            _ => continue,
        }
    }
    out.sort();
    Ok(out)
}

async fn subdirs(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(io_err(dir))? {
        if matches!(entry.file_type().await, Ok(ft) if ft.is_dir()) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Message files of one channel paired with the sequence id parsed from the file name.
async fn message_files(dir: &Path) -> StoreResult<Vec<(i64, PathBuf)>> {
    let mut out = Vec::new();
    for path in json_files(dir).await? {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i64>().ok());
        match id {
            Some(id) => out.push((id, path)),
            None => warn!(path = %path.display(), "skipping message file with non-numeric name"),
        }
    }
    Ok(out)
}

async fn load_lenient<T: DeserializeOwned>(paths: impl IntoIterator<Item = PathBuf>) -> Vec<T> {
    let mut out = Vec::new();
    for path in paths {
        match read_record(&path).await {
            Ok(v) => out.push(v),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Media, MediaKind};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn channel(id: &str) -> Channel {
        Channel::new(id, "handle", "Title", UserId(1), ts(1_700_000_000))
    }

    fn message(channel_id: &str, id: i64, text: &str, date: i64) -> Message {
        Message {
            id,
            channel_id: channel_id.to_string(),
            channel_name: "Title".to_string(),
            text: text.to_string(),
            author: "Unknown".to_string(),
            date: ts(date),
            link: format!("https://t.me/handle/{id}"),
            media: vec![Media {
                kind: MediaKind::Photo,
                file_ref: "AgAD".to_string(),
                caption: None,
            }],
        }
    }

    async fn open() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn open_creates_entity_directories() {
        let (dir, _store) = open().await;
        assert!(dir.path().join("channels").is_dir());
        assert!(dir.path().join("messages").is_dir());
        assert!(dir.path().join("users").is_dir());
    }

    #[tokio::test]
    async fn channel_upsert_get_delete() {
        let (_dir, store) = open().await;
        let mut ch = channel("-1001");
        ChannelStore::save(&store, &ch).await.unwrap();

        ch.title = "Renamed".to_string();
        ChannelStore::save(&store, &ch).await.unwrap();

        let got = ChannelStore::get(&store, "-1001").await.unwrap();
        assert_eq!(got.title, "Renamed");
        assert_eq!(ChannelStore::list_all(&store).await.unwrap().len(), 1);

        ChannelStore::delete(&store, "-1001").await.unwrap();
        let err = ChannelStore::get(&store, "-1001").await.unwrap_err();
        assert!(err.is_not_found());
        let err = ChannelStore::delete(&store, "-1001").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn path_like_keys_are_refused() {
        let (_dir, store) = open().await;
        let err = ChannelStore::save(&store, &channel("../escape")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
        let err = ChannelStore::get(&store, "..").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listing_skips_corrupt_records() {
        let (dir, store) = open().await;
        ChannelStore::save(&store, &channel("1")).await.unwrap();
        ChannelStore::save(&store, &channel("2")).await.unwrap();
        std::fs::write(dir.path().join("channels/3.json"), b"{ not json").unwrap();
        std::fs::write(dir.path().join("channels/notes.txt"), b"ignored").unwrap();

        let mut ids: Vec<_> = ChannelStore::list_all(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);

        let err = ChannelStore::get(&store, "3").await.unwrap_err();
        assert!(matches!(err, StoreError::Serde { .. }));
    }

    #[tokio::test]
    async fn list_by_channel_orders_by_numeric_sequence_id() {
        let (_dir, store) = open().await;
        for id in [2, 10, 9, 1] {
            MessageStore::save(&store, &message("42", id, "t", 1_700_000_000 + id))
                .await
                .unwrap();
        }
        MessageStore::save(&store, &message("43", 99, "other", 1_700_000_000))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_by_channel("42", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![10, 9, 2]);
    }

    #[tokio::test]
    async fn list_by_channel_skips_corrupt_without_consuming_limit() {
        let (dir, store) = open().await;
        for id in [1, 2, 3] {
            MessageStore::save(&store, &message("42", id, "t", 1_700_000_000))
                .await
                .unwrap();
        }
        std::fs::write(dir.path().join("messages/42/4.json"), b"garbage").unwrap();

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
    async fn list_by_unknown_channel_is_empty() {
        let (_dir, store) = open().await;
        assert!(store.list_by_channel("nope", 50).await.unwrap().is_empty());
        assert!(store.list_since("nope", ts(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_since_is_strictly_newer() {
        let (_dir, store) = open().await;
        MessageStore::save(&store, &message("42", 1, "old", 100)).await.unwrap();
        MessageStore::save(&store, &message("42", 2, "edge", 200)).await.unwrap();
        MessageStore::save(&store, &message("42", 3, "new", 300)).await.unwrap();

        let ids: Vec<_> = store
            .list_since("42", ts(200))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn message_upsert_overwrites_same_key() {
        let (_dir, store) = open().await;
        MessageStore::save(&store, &message("42", 7, "first", 100)).await.unwrap();
        MessageStore::save(&store, &message("42", 7, "second", 100)).await.unwrap();

        let all = MessageStore::list_all(&store).await.unwrap();
        assert_eq!(all.len(), 1);
        let got = MessageStore::get(&store, &MessageKey::new("42", 7)).await.unwrap();
        assert_eq!(got.text, "second");
        assert_eq!(got.media.len(), 1);
    }

    #[tokio::test]
    async fn users_roundtrip_and_list() {
        let (_dir, store) = open().await;
        let user = User {
            id: UserId(5),
            handle: "alice".to_string(),
            added_at: ts(1),
            is_admin: true,
        };
        UserStore::save(&store, &user).await.unwrap();
        assert_eq!(UserStore::get(&store, UserId(5)).await.unwrap(), user);
        assert_eq!(UserStore::list_all(&store).await.unwrap().len(), 1);
        UserStore::delete(&store, UserId(5)).await.unwrap();
        assert!(UserStore::list_all(&store).await.unwrap().is_empty());
    }
}
