//! HTTP adapter (axum): serves per-channel RSS feeds.

use std::fmt::Write as _;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use tgfeed_core::{feed::FeedGenerator, formatting::escape_html, store::Stores};

pub mod feed_xml;

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";
pub const RSS_CACHE_CONTROL: &str = "public, max-age=300";

#[derive(Clone)]
pub struct HttpState {
    pub stores: Stores,
    pub feeds: FeedGenerator,
    /// Used when a request carries no `Host` header.
    pub public_base_url: String,
}

impl HttpState {
    pub fn new(stores: Stores, public_base_url: impl Into<String>) -> Self {
        Self {
            feeds: FeedGenerator::new(stores.clone()),
            stores,
            public_base_url: public_base_url.into(),
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/rss/{channel_id}", get(rss_feed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("http server stopped");
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn rss_feed(
    State(state): State<HttpState>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let base = base_url(&headers, &state.public_base_url);
    match state.feeds.generate(&channel_id, &base).await {
        Ok(doc) => (
            [
                (header::CONTENT_TYPE, RSS_CONTENT_TYPE),
                (header::CACHE_CONTROL, RSS_CACHE_CONTROL),
            ],
            feed_xml::render_rss(&doc),
        )
            .into_response(),
        Err(e) if e.is_not_found() => (StatusCode::NOT_FOUND, "Channel not found").into_response(),
        Err(e) => {
            error!(channel_id = %channel_id, error = %e, "failed to generate feed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate feed").into_response()
        }
    }
}

async fn index(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let mut channels = match state.stores.channels.list_all().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to list channels");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list channels").into_response();
        }
    };
    channels.sort_by(|a, b| a.title.cmp(&b.title));
    let base = base_url(&headers, &state.public_base_url);

    let mut body = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Telegram RSS Feeds</title></head><body>\n<h1>Telegram RSS Feeds</h1>\n",
    );
    if channels.is_empty() {
        body.push_str("<p>No channels yet. Add one with /addchannel in the bot chat.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for ch in &channels {
            let url = format!("{base}/rss/{}", ch.id);
            let paused = if ch.is_active { "" } else { " (paused)" };
            let _ = writeln!(
                body,
                "<li><a href=\"{}\">{}</a> @{}{paused}</li>",
                escape_html(&url),
                escape_html(&ch.title),
                escape_html(&ch.handle)
            );
        }
        body.push_str("</ul>\n");
    }
    body.push_str("<p><a href=\"/health\">health</a></p>\n</body></html>\n");
    Html(body).into_response()
}

/// `{proto}://{host}` from `X-Forwarded-Proto` (default `http`) and `Host`.
pub fn base_url(headers: &HeaderMap, fallback: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty());
    let Some(host) = host else {
        return fallback.trim_end_matches('/').to_string();
    };
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("http");
    format!("{proto}://{host}")
}
