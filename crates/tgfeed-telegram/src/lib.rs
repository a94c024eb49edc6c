//! Telegram adapter (teloxide).
//!
//! Feeds channel posts into the ingestion pipeline, carries chat commands to
//! the command service and resolves `@handles` for `/addchannel`.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
};

use tokio::time::sleep;
use tracing::warn;

pub mod handlers;
pub mod router;

use tgfeed_core::{
    commands::{ChannelDirectory, ResolvedChannel},
    errors::Error,
    Result,
};

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// Run a Bot API request, retrying once when Telegram asks us to back off.
async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => match e {
                teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(retry_after = ?d, "telegram rate limit hit, retrying");
                    sleep(d).await;
                    continue;
                }
                other => return Err(map_err(other)),
            },
        }
    }
}

/// Send an HTML reply to a chat.
pub async fn send_html(bot: &Bot, chat_id: ChatId, html: &str) -> Result<()> {
    with_retry(|| {
        bot.send_message(chat_id, html.to_string())
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
    })
    .await?;
    Ok(())
}

/// [`ChannelDirectory`] backed by `getChat`.
#[derive(Clone)]
pub struct TelegramDirectory {
    bot: Bot,
}

impl TelegramDirectory {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChannelDirectory for TelegramDirectory {
    async fn resolve(&self, handle: &str) -> Result<ResolvedChannel> {
        let handle = handle.trim_start_matches('@');
        let chat = with_retry(|| {
            self.bot
                .get_chat(Recipient::ChannelUsername(format!("@{handle}")))
        })
        .await?;

        if !chat.is_channel() {
            return Err(Error::External(format!("@{handle} is not a channel")));
        }

        Ok(ResolvedChannel {
            id: chat.id.0.to_string(),
            handle: chat.username().unwrap_or(handle).to_string(),
            title: chat.title().unwrap_or(handle).to_string(),
        })
    }
}
