use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use tgfeed_core::{commands::CommandService, config::Config, ingest::IngestPipeline};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub commands: CommandService,
    pub ingest: IngestPipeline,
}

/// Build the bot client, pointing it at a custom Bot API server when configured.
pub fn build_bot(cfg: &Config) -> anyhow::Result<Bot> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    if cfg.uses_default_api_url() {
        return Ok(bot);
    }
    let url = reqwest::Url::parse(&cfg.telegram_api_url)
        .map_err(|e| anyhow::anyhow!("invalid TELEGRAM_API_URL {}: {e}", cfg.telegram_api_url))?;
    info!(api_url = %url, "using custom Telegram Bot API server");
    Ok(bot.set_api_url(url))
}

/// Long-poll for updates until Ctrl-C.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telegram bot started"),
        Err(e) => warn!(error = %e, "getMe failed; continuing"),
    }

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_channel_post))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
    Ok(())
}
