use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tgfeed_core::{
    commands::{CommandService, ServiceInfo},
    config::Config,
    ingest::IngestPipeline,
    monitor::ChannelMonitor,
    security::Authorizer,
    store::Stores,
};
use tgfeed_http::HttpState;
use tgfeed_telegram::{
    router::{build_bot, run_polling, AppState},
    TelegramDirectory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    tgfeed_core::logging::init("tgfeed", cfg.app_env)?;
    info!(
        storage = %cfg.storage_path.display(),
        backend = ?cfg.storage_backend,
        app_env = ?cfg.app_env,
        "starting tgfeed"
    );

    let stores = Stores::open(cfg.storage_backend, &cfg.storage_path).await?;

    let monitor = ChannelMonitor::new(stores.clone(), cfg.update_interval);
    monitor.start().await;

    let shutdown = CancellationToken::new();
    let listener = TcpListener::bind(cfg.http_addr()?).await?;
    let http_state = HttpState::new(stores.clone(), cfg.public_base_url.clone());
    let http = tokio::spawn(tgfeed_http::serve(listener, http_state, shutdown.clone()));

    let bot = build_bot(&cfg)?;
    let commands = CommandService::new(
        stores.clone(),
        monitor.clone(),
        Arc::new(TelegramDirectory::new(bot.clone())),
        Authorizer::new(cfg.allowed_users.clone(), stores.users.clone()),
        ServiceInfo::from_config(&cfg),
    );
    let state = Arc::new(AppState {
        commands,
        ingest: IngestPipeline::new(stores.clone()),
    });

    let polled = run_polling(bot, state).await;

    info!("shutting down");
    monitor.stop().await;
    shutdown.cancel();
    match http.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http server failed"),
        Err(e) => error!(error = %e, "http server task panicked"),
    }

    polled
}
