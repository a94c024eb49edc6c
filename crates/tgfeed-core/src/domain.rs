//! Persisted entities: channels, their filters, ingested messages and users.
//!
//! Field names on the wire are snake_case and stable; stored JSON written by
//! earlier versions (which used `username` for the channel handle and
//! `file_id` for media references) still deserializes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monitored source channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Platform-assigned numeric id, string encoded. Immutable.
    pub id: String,
    #[serde(alias = "username")]
    pub handle: String,
    pub title: String,
    pub added_by: UserId,
    pub added_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// Evaluated in order; see [`crate::filter::passes`].
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub is_active: bool,
}

impl Channel {
    pub fn new(
        id: impl Into<String>,
        handle: impl Into<String>,
        title: impl Into<String>,
        added_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            title: title.into(),
            added_by,
            added_at: now,
            last_update: now,
            filters: Vec::new(),
            is_active: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    #[serde(rename = "keywords")]
    IncludeKeywords,
    #[serde(rename = "exclude_keywords")]
    ExcludeKeywords,
    #[serde(rename = "author")]
    ByAuthor,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterKind::IncludeKeywords => "include",
            FilterKind::ExcludeKeywords => "exclude",
            FilterKind::ByAuthor => "author",
        };
        f.write_str(s)
    }
}

/// A content admission rule attached to a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub enabled: bool,
}

impl Filter {
    pub fn include(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: FilterKind::IncludeKeywords,
            keywords: keywords.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    pub fn exclude(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind: FilterKind::ExcludeKeywords,
            keywords: keywords.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
        };
        f.write_str(s)
    }
}

/// One attachment. `file_ref` points into the platform's file storage; the
/// bytes themselves are never downloaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(alias = "file_id")]
    pub file_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Primary key of a stored message: sequence ids are only unique per channel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageKey {
    pub channel_id: String,
    pub id: i64,
}

impl MessageKey {
    pub fn new(channel_id: impl Into<String>, id: i64) -> Self {
        Self {
            channel_id: channel_id.into(),
            id,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.channel_id, self.id)
    }
}

/// An ingested post. Never mutated once stored; re-ingesting the same key
/// replaces the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel_id: String,
    pub channel_name: String,
    pub text: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub link: String,
    #[serde(default)]
    pub media: Vec<Media>,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.channel_id.clone(), self.id)
    }
}

/// An authorization record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(alias = "username")]
    pub handle: String,
    pub added_at: DateTime<Utc>,
    pub is_admin: bool,
}
