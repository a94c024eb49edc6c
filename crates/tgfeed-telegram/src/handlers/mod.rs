//! Telegram update handlers.
//!
//! Channel posts go to the ingestion pipeline; everything else typed in a
//! private or group chat is treated as a potential command.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod channel_post;
mod commands;

pub use channel_post::to_inbound;

pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    channel_post::handle(msg, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Some deployments see channel posts as plain messages.
    if msg.chat.is_channel() {
        return channel_post::handle(msg, state).await;
    }

    if msg.text().is_some_and(|t| t.starts_with('/')) {
        return commands::handle_command(bot, msg, state).await;
    }

    Ok(())
}
