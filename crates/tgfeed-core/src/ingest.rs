//! Ingestion pipeline: one inbound post in, at most one stored message out.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    domain::{Channel, Media, Message, MessageKey},
    filter,
    store::{StoreError, Stores},
};

/// A post as delivered by the platform adapter, before any channel lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundPost {
    pub channel_id: String,
    pub text: String,
    pub caption: String,
    pub date: DateTime<Utc>,
    pub sequence_id: i64,
    pub author: String,
    pub media: Vec<Media>,
    /// Explicit permalink; when absent one is derived from the channel.
    pub link: Option<String>,
}

impl InboundPost {
    /// Text if non-empty, else caption.
    pub fn effective_text(&self) -> &str {
        if self.text.is_empty() {
            &self.caption
        } else {
            &self.text
        }
    }

    pub fn link_for(&self, channel: &Channel) -> String {
        if let Some(link) = &self.link {
            return link.clone();
        }
        if !channel.handle.is_empty() {
            return format!("https://t.me/{}/{}", channel.handle, self.sequence_id);
        }
        // Private supergroups/channels: "-100" + internal id.
        let internal = channel
            .id
            .strip_prefix("-100")
            .unwrap_or_else(|| channel.id.trim_start_matches('-'));
        format!("https://t.me/c/{internal}/{}", self.sequence_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    UnknownChannel,
    Inactive,
    Filtered,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to look up channel {channel_id}: {source}")]
    ChannelLookup {
        channel_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to persist message {key}: {source}")]
    Persist {
        key: MessageKey,
        #[source]
        source: StoreError,
    },
}

#[derive(Clone)]
pub struct IngestPipeline {
    stores: Stores,
}

impl IngestPipeline {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn ingest(&self, post: InboundPost) -> Result<IngestOutcome, IngestError> {
        let channel = match self.stores.channels.get(&post.channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => {
                debug!(channel_id = %post.channel_id, "post for unregistered channel ignored");
                return Ok(IngestOutcome::UnknownChannel);
            }
            Err(source) => {
                return Err(IngestError::ChannelLookup {
                    channel_id: post.channel_id,
                    source,
                })
            }
        };

        if !channel.is_active {
            debug!(channel_id = %channel.id, "post for paused channel ignored");
            return Ok(IngestOutcome::Inactive);
        }

        let text = post.effective_text().to_string();
        if !filter::passes(&channel.filters, &text) {
            debug!(channel_id = %channel.id, message_id = post.sequence_id, "post filtered out");
            return Ok(IngestOutcome::Filtered);
        }

        let message = Message {
            id: post.sequence_id,
            channel_id: channel.id.clone(),
            channel_name: channel.title.clone(),
            link: post.link_for(&channel),
            text,
            author: post.author,
            date: post.date,
            media: post.media,
        };

        self.stores
            .messages
            .save(&message)
            .await
            .map_err(|source| IngestError::Persist {
                key: message.key(),
                source,
            })?;

        self.touch_channel(&channel.id).await;

        debug!(channel_id = %channel.id, message_id = message.id, "message stored");
        Ok(IngestOutcome::Stored)
    }

    /// Re-read under the channel edit lock; only `last_update` changes.
    async fn touch_channel(&self, channel_id: &str) {
        let _edit = self.stores.lock_channel_edits().await;
        let result = match self.stores.channels.get(channel_id).await {
            Ok(mut current) => {
                current.last_update = Utc::now();
                self.stores.channels.save(&current).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(channel_id = %channel_id, error = %e, "failed to update channel last_update");
        }
    }
}
