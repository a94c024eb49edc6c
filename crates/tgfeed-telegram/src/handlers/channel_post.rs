use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, User},
};
use tracing::{debug, error, info};

use tgfeed_core::{
    domain::{Media, MediaKind},
    ingest::{InboundPost, IngestOutcome},
};

use crate::router::AppState;

pub async fn handle(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let post = to_inbound(&msg);
    let channel_id = post.channel_id.clone();
    let message_id = post.sequence_id;

    match state.ingest.ingest(post).await {
        Ok(IngestOutcome::Stored) => {
            info!(channel_id = %channel_id, message_id, "new message from channel")
        }
        Ok(outcome) => debug!(channel_id = %channel_id, message_id, ?outcome, "post not stored"),
        Err(e) => error!(channel_id = %channel_id, message_id, error = %e, "failed to ingest post"),
    }
    Ok(())
}

/// Map a channel post onto the pipeline's input.
pub fn to_inbound(msg: &Message) -> InboundPost {
    InboundPost {
        channel_id: msg.chat.id.0.to_string(),
        text: msg.text().unwrap_or_default().to_string(),
        caption: msg.caption().unwrap_or_default().to_string(),
        date: msg.date,
        sequence_id: i64::from(msg.id.0),
        author: author_name(msg.from()),
        media: extract_media(msg),
        link: msg
            .chat
            .username()
            .map(|u| format!("https://t.me/{u}/{}", msg.id.0)),
    }
}

fn author_name(user: Option<&User>) -> String {
    if let Some(user) = user {
        if let Some(username) = user.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{username}");
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

fn extract_media(msg: &Message) -> Vec<Media> {
    let mut media = Vec::new();
    let mut push = |kind, file_ref: &str| {
        media.push(Media {
            kind,
            file_ref: file_ref.to_string(),
            caption: None,
        })
    };

    // Telegram lists photo sizes smallest first.
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        push(MediaKind::Photo, &photo.file.id);
    }
    if let Some(video) = msg.video() {
        push(MediaKind::Video, &video.file.id);
    }
    if let Some(doc) = msg.document() {
        push(MediaKind::Document, &doc.file.id);
    }
    if let Some(audio) = msg.audio() {
        push(MediaKind::Audio, &audio.file.id);
    }
    media
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(extra: serde_json::Value) -> Message {
        let mut v = json!({
            "message_id": 7,
            "date": 1_700_000_000,
            "chat": {
                "id": -1001234567890i64,
                "type": "channel",
                "title": "Rust News",
                "username": "rustnews"
            }
        });
        if let (Some(obj), Some(extra)) = (v.as_object_mut(), extra.as_object()) {
            for (k, val) in extra {
                obj.insert(k.clone(), val.clone());
            }
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn maps_text_post() {
        let post = to_inbound(&message(json!({ "text": "hello world" })));
        assert_eq!(post.channel_id, "-1001234567890");
        assert_eq!(post.sequence_id, 7);
        assert_eq!(post.text, "hello world");
        assert_eq!(post.caption, "");
        assert_eq!(post.date.timestamp(), 1_700_000_000);
        assert_eq!(post.author, "Unknown");
        assert_eq!(post.link.as_deref(), Some("https://t.me/rustnews/7"));
        assert!(post.media.is_empty());
    }

    #[test]
    fn maps_photo_with_caption_to_largest_size() {
        let post = to_inbound(&message(json!({
            "caption": "Sunset",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 60, "file_size": 1000 },
                { "file_id": "large", "file_unique_id": "l", "width": 1280, "height": 853, "file_size": 90000 }
            ]
        })));
        assert_eq!(post.effective_text(), "Sunset");
        assert_eq!(post.media.len(), 1);
        assert_eq!(post.media[0].kind, MediaKind::Photo);
        assert_eq!(post.media[0].file_ref, "large");
    }

    #[test]
    fn maps_document() {
        let post = to_inbound(&message(json!({
            "document": { "file_id": "doc1", "file_unique_id": "d1", "file_name": "a.pdf" }
        })));
        assert_eq!(post.media.len(), 1);
        assert_eq!(post.media[0].kind, MediaKind::Document);
        assert_eq!(post.media[0].file_ref, "doc1");
    }

    #[test]
    fn author_prefers_username() {
        let user: User = serde_json::from_value(json!({
            "id": 1, "is_bot": false, "first_name": "Alice", "username": "alice"
        }))
        .unwrap();
        assert_eq!(author_name(Some(&user)), "@alice");

        let user: User = serde_json::from_value(json!({
            "id": 2, "is_bot": false, "first_name": "Bob"
        }))
        .unwrap();
        assert_eq!(author_name(Some(&user)), "Bob");
        assert_eq!(author_name(None), "Unknown");
    }
}
