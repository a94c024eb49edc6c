//! Feed generator: turns a channel's recent messages into a [`FeedDocument`].
//!
//! The document is wire-format agnostic; the HTTP adapter renders it as RSS 2.0.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::{
    domain::{Channel, Message},
    formatting::{escape_html, truncate_chars},
    store::{StoreResult, Stores},
};

/// Number of most recent messages included in a feed.
pub const FEED_WINDOW: usize = 50;
pub const TITLE_MAX_CHARS: usize = 100;
const EMPTY_BODY: &str = "No text content";

#[derive(Clone, Debug, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeedEntry {
    /// `"{channel_id}-{message_id}"`
    pub id: String,
    pub title: String,
    pub link: String,
    /// Plain-text body.
    pub description: String,
    /// HTML body.
    pub content: String,
    pub author: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeedGenerator {
    stores: Stores,
}

impl FeedGenerator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Paused channels still get a feed of what was stored before the pause.
    pub async fn generate(&self, channel_id: &str, base_url: &str) -> StoreResult<FeedDocument> {
        let channel = self.stores.channels.get(channel_id).await?;
        let messages = self
            .stores
            .messages
            .list_by_channel(&channel.id, FEED_WINDOW)
            .await?;
        Ok(build_document(&channel, &messages, base_url))
    }
}

pub fn build_document(channel: &Channel, messages: &[Message], base_url: &str) -> FeedDocument {
    let base = base_url.trim_end_matches('/');
    FeedDocument {
        title: format!("{} - RSS Feed", channel.title),
        link: format!("{base}/rss/{}", channel.id),
        description: format!("RSS feed for Telegram channel: {}", channel.title),
        author: channel.handle.clone(),
        created: channel.added_at,
        updated: channel.last_update,
        entries: messages.iter().map(build_entry).collect(),
    }
}

pub fn build_entry(message: &Message) -> FeedEntry {
    let mut body = if message.text.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        message.text.clone()
    };
    if !message.media.is_empty() {
        body.push_str("\n\nMedia:\n");
        for m in &message.media {
            let _ = writeln!(body, "- {}: {}", m.kind, m.file_ref);
            if let Some(caption) = m.caption.as_deref().filter(|c| !c.is_empty()) {
                let _ = writeln!(body, "  Caption: {caption}");
            }
        }
    }

    let mut content = format!("<p>{}</p>", escape_html(&body));
    if !message.media.is_empty() {
        content.push_str("<p><strong>Media attachments:</strong></p><ul>");
        for m in &message.media {
            let _ = write!(content, "<li>{}: {}</li>", m.kind, escape_html(&m.file_ref));
        }
        content.push_str("</ul>");
    }

    FeedEntry {
        id: message.key().to_string(),
        title: truncate_chars(&message.text, TITLE_MAX_CHARS),
        link: message.link.clone(),
        description: body,
        content,
        author: message.author.clone(),
        created: message.date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Media, MediaKind, UserId};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(id: i64, text: &str) -> Message {
        Message {
            id,
            channel_id: "42".to_string(),
            channel_name: "Test Channel".to_string(),
            text: text.to_string(),
            author: "@alice".to_string(),
            date: ts(2_000 + id),
            link: format!("https://t.me/testchan/{id}"),
            media: Vec::new(),
        }
    }

    async fn setup(messages: &[Message]) -> FeedGenerator {
        let stores = Stores::memory();
        let ch = Channel::new("42", "testchan", "Test Channel", UserId(1), ts(1_000));
        stores.channels.save(&ch).await.unwrap();
        for m in messages {
            stores.messages.save(m).await.unwrap();
        }
        FeedGenerator::new(stores)
    }

    #[tokio::test]
    async fn feed_escapes_content_and_sets_metadata() {
        let feeds = setup(&[message(1, "Hello <world>")]).await;
        let doc = feeds.generate("42", "http://localhost:8080/").await.unwrap();

        assert_eq!(doc.title, "Test Channel - RSS Feed");
        assert_eq!(doc.link, "http://localhost:8080/rss/42");
        assert_eq!(doc.description, "RSS feed for Telegram channel: Test Channel");
        assert_eq!(doc.author, "testchan");
        assert_eq!(doc.created, ts(1_000));
        assert_eq!(doc.entries.len(), 1);

        let e = &doc.entries[0];
        assert!(e.content.contains("Hello &lt;world&gt;"));
        assert_eq!(e.description, "Hello <world>");
        assert_eq!(e.id, "42-1");
        assert_eq!(e.link, "https://t.me/testchan/1");
        assert_eq!(e.author, "@alice");
    }

    #[test]
    fn long_text_title_is_truncated() {
        let e = build_entry(&message(1, &"x".repeat(150)));
        assert_eq!(e.title.chars().count(), 103);
        assert!(e.title.ends_with("..."));
        assert_eq!(e.description.chars().count(), 150);
    }

    #[test]
    fn empty_text_and_media_listing() {
        let mut m = message(3, "");
        m.media = vec![
            Media {
                kind: MediaKind::Photo,
                file_ref: "AgAD".to_string(),
                caption: Some("a cat".to_string()),
            },
            Media {
                kind: MediaKind::Document,
                file_ref: "BQAC".to_string(),
                caption: None,
            },
        ];
        let e = build_entry(&m);
        assert_eq!(
            e.description,
            "No text content\n\nMedia:\n- photo: AgAD\n  Caption: a cat\n- document: BQAC\n"
        );
        assert!(e.content.ends_with(
            "<p><strong>Media attachments:</strong></p><ul><li>photo: AgAD</li><li>document: BQAC</li></ul>"
        ));
        assert_eq!(e.title, "");
    }

    #[tokio::test]
    async fn entries_are_newest_first_and_windowed() {
        let messages: Vec<_> = (1..=60).map(|i| message(i, &format!("post {i}"))).collect();
        let feeds = setup(&messages).await;
        let doc = feeds.generate("42", "http://x").await.unwrap();
        assert_eq!(doc.entries.len(), FEED_WINDOW);
        assert_eq!(doc.entries[0].id, "42-60");
        assert_eq!(doc.entries[FEED_WINDOW - 1].id, "42-11");
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let feeds = setup(&[]).await;
        let err = feeds.generate("nope", "http://x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn paused_channel_still_has_feed() {
        let stores = Stores::memory();
        let mut ch = Channel::new("7", "p", "Paused", UserId(1), ts(0));
        ch.is_active = false;
        stores.channels.save(&ch).await.unwrap();
        let mut m = message(1, "kept");
        m.channel_id = "7".to_string();
        stores.messages.save(&m).await.unwrap();

        let doc = FeedGenerator::new(stores).generate("7", "http://x").await.unwrap();
        assert_eq!(doc.entries.len(), 1);
    }
}
