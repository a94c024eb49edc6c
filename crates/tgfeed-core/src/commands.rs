//! Chat commands: parsing and execution against the stores and the monitor.
//!
//! The transport adapter hands over raw message text and sends back the HTML
//! reply; nothing here knows about Telegram types.

use std::{fmt::Write as _, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::{
    config::Config,
    domain::{Channel, Filter, UserId},
    formatting::escape_html,
    monitor::ChannelMonitor,
    security::Authorizer,
    store::Stores,
    Result,
};

/// A channel as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: String,
    pub handle: String,
    pub title: String,
}

/// Looks up a public channel by its `@handle`.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn resolve(&self, handle: &str) -> Result<ResolvedChannel>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    AddChannel { handle: String },
    RemoveChannel { channel_id: String },
    ListChannels,
    AddFilter { channel_id: String, keywords: Vec<String> },
    ExcludeFilter { channel_id: String, keywords: Vec<String> },
    RemoveFilter { channel_id: String, index: usize },
    PauseChannel { channel_id: String },
    ResumeChannel { channel_id: String },
    RssLink { channel_id: Option<String> },
    Status,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    NotACommand,
    Unknown(String),
    /// Missing or malformed arguments; carries the reply to send.
    Usage(&'static str),
}

const USAGE_ADD_CHANNEL: &str =
    "Usage: /addchannel &lt;@channel&gt;\nExample: /addchannel @example_channel";
const USAGE_REMOVE_CHANNEL: &str = "Usage: /removechannel &lt;channel_id&gt;";
const USAGE_ADD_FILTER: &str = "Usage: /addfilter &lt;channel_id&gt; &lt;keyword1,keyword2,...&gt;\nExample: /addfilter -1001234567890 tech,programming";
const USAGE_EXCLUDE_FILTER: &str = "Usage: /excludefilter &lt;channel_id&gt; &lt;keyword1,keyword2,...&gt;\nExample: /excludefilter -1001234567890 ads,promo";
const USAGE_REMOVE_FILTER: &str = "Usage: /removefilter &lt;channel_id&gt; &lt;filter_number&gt;";
const INVALID_FILTER_INDEX: &str = "❌ Invalid filter number";
const USAGE_PAUSE: &str = "Usage: /pausechannel &lt;channel_id&gt;";
const USAGE_RESUME: &str = "Usage: /resumechannel &lt;channel_id&gt;";

const HELP: &str = "👋 <b>Telegram RSS Feed Bot</b>

I turn Telegram channels into RSS feeds.

<b>Commands:</b>
/help - Show this message
/addchannel &lt;@channel&gt; - Start monitoring a channel
/removechannel &lt;channel_id&gt; - Stop monitoring a channel
/listchannels - List monitored channels
/addfilter &lt;channel_id&gt; &lt;kw1,kw2&gt; - Only keep posts with a keyword
/excludefilter &lt;channel_id&gt; &lt;kw1,kw2&gt; - Drop posts with a keyword
/removefilter &lt;channel_id&gt; &lt;n&gt; - Remove filter number n
/pausechannel &lt;channel_id&gt; - Pause ingestion
/resumechannel &lt;channel_id&gt; - Resume ingestion
/rsslink [channel_id] - Get feed links
/status - Show bot status

The bot must be an administrator of the channel to receive its posts.";

fn split_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Comma separated, trimmed, empties dropped.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl Command {
    pub fn parse(text: &str) -> std::result::Result<Command, ParseError> {
        if !text.trim_start().starts_with('/') {
            return Err(ParseError::NotACommand);
        }
        let (cmd, rest) = split_command(text);
        let mut args = rest.split_whitespace();
        let mut arg = || args.next().map(str::to_string);

        let command = match cmd.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "addchannel" => {
                let handle = arg()
                    .map(|h| h.trim_start_matches('@').to_string())
                    .filter(|h| !h.is_empty())
                    .ok_or(ParseError::Usage(USAGE_ADD_CHANNEL))?;
                Command::AddChannel { handle }
            }
            "removechannel" => Command::RemoveChannel {
                channel_id: arg().ok_or(ParseError::Usage(USAGE_REMOVE_CHANNEL))?,
            },
            "listchannels" => Command::ListChannels,
            "addfilter" | "excludefilter" => {
                let usage = if cmd == "addfilter" {
                    USAGE_ADD_FILTER
                } else {
                    USAGE_EXCLUDE_FILTER
                };
                let channel_id = arg().ok_or(ParseError::Usage(usage))?;
                // Keywords may be written with spaces after the commas.
                let rest: Vec<String> = std::iter::from_fn(&mut arg).collect();
                let keywords = parse_keywords(&rest.join(" "));
                if keywords.is_empty() {
                    return Err(ParseError::Usage(usage));
                }
                if cmd == "addfilter" {
                    Command::AddFilter { channel_id, keywords }
                } else {
                    Command::ExcludeFilter { channel_id, keywords }
                }
            }
            "removefilter" => {
                let channel_id = arg().ok_or(ParseError::Usage(USAGE_REMOVE_FILTER))?;
                let index = arg()
                    .ok_or(ParseError::Usage(USAGE_REMOVE_FILTER))?
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or(ParseError::Usage(INVALID_FILTER_INDEX))?;
                Command::RemoveFilter { channel_id, index }
            }
            "pausechannel" => Command::PauseChannel {
                channel_id: arg().ok_or(ParseError::Usage(USAGE_PAUSE))?,
            },
            "resumechannel" => Command::ResumeChannel {
                channel_id: arg().ok_or(ParseError::Usage(USAGE_RESUME))?,
            },
            "rsslink" => Command::RssLink { channel_id: arg() },
            "status" => Command::Status,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Values shown by `/status` and used to build feed links.
#[derive(Clone, Debug)]
pub struct ServiceInfo {
    pub public_base_url: String,
    pub http_port: u16,
    pub storage_path: String,
    pub update_interval: Duration,
}

impl ServiceInfo {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            public_base_url: cfg.public_base_url.clone(),
            http_port: cfg.http_port,
            storage_path: cfg.storage_path.display().to_string(),
            update_interval: cfg.update_interval,
        }
    }

    pub fn feed_url(&self, channel_id: &str) -> String {
        format!("{}/rss/{channel_id}", self.public_base_url.trim_end_matches('/'))
    }
}

/// Who sent a command.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user_id: UserId,
    pub handle: String,
}

#[derive(Clone)]
pub struct CommandService {
    stores: Stores,
    monitor: ChannelMonitor,
    directory: Arc<dyn ChannelDirectory>,
    authorizer: Authorizer,
    info: ServiceInfo,
}

impl CommandService {
    pub fn new(
        stores: Stores,
        monitor: ChannelMonitor,
        directory: Arc<dyn ChannelDirectory>,
        authorizer: Authorizer,
        info: ServiceInfo,
    ) -> Self {
        Self {
            stores,
            monitor,
            directory,
            authorizer,
            info,
        }
    }

    /// Handle one chat message. Returns `None` when the text is not a command.
    pub async fn handle(&self, caller: &Caller, text: &str) -> Option<String> {
        let parsed = Command::parse(text);
        if parsed == Err(ParseError::NotACommand) {
            return None;
        }

        let access = self.authorizer.check(caller.user_id, &caller.handle).await;
        if !access.is_granted() {
            let reply = match parsed {
                Ok(Command::Start | Command::Help) => "❌ You are not authorized to use this bot.",
                _ => "❌ Unauthorized",
            };
            return Some(reply.to_string());
        }

        let reply = match parsed {
            Ok(command) => self.execute(caller, command).await,
            Err(ParseError::Usage(usage)) => usage.to_string(),
            Err(ParseError::Unknown(cmd)) => format!(
                "Unknown command: /{}\nUse /help to see available commands.",
                escape_html(&cmd)
            ),
            Err(ParseError::NotACommand) => return None,
        };
        Some(reply)
    }

    pub async fn execute(&self, caller: &Caller, command: Command) -> String {
        match command {
            Command::Start | Command::Help => HELP.to_string(),
            Command::AddChannel { handle } => self.add_channel(caller, &handle).await,
            Command::RemoveChannel { channel_id } => self.remove_channel(&channel_id).await,
            Command::ListChannels => self.list_channels().await,
            Command::AddFilter {
                channel_id,
                keywords,
            } => self.add_filter(&channel_id, Filter::include(keywords)).await,
            Command::ExcludeFilter {
                channel_id,
                keywords,
            } => self.add_filter(&channel_id, Filter::exclude(keywords)).await,
            Command::RemoveFilter { channel_id, index } => {
                self.remove_filter(&channel_id, index).await
            }
            Command::PauseChannel { channel_id } => self.set_active(&channel_id, false).await,
            Command::ResumeChannel { channel_id } => self.set_active(&channel_id, true).await,
            Command::RssLink { channel_id } => self.rss_link(channel_id.as_deref()).await,
            Command::Status => self.status().await,
        }
    }

    async fn add_channel(&self, caller: &Caller, handle: &str) -> String {
        let resolved = match self.directory.resolve(handle).await {
            Ok(r) => r,
            Err(e) => {
                return format!(
                    "❌ Failed to get channel info: {}\nMake sure the bot is added to the channel as an administrator.",
                    escape_html(&e.to_string())
                )
            }
        };

        let _edit = self.stores.lock_channel_edits().await;
        match self.stores.channels.get(&resolved.id).await {
            Ok(existing) => {
                if existing.is_active {
                    self.monitor.add_channel(existing.id.clone()).await;
                }
                return format!(
                    "ℹ️ Channel @{} is already monitored.\nChannel ID: <code>{}</code>",
                    escape_html(&existing.handle),
                    escape_html(&existing.id)
                );
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return store_failure("add channel", &e),
        }

        let channel = Channel::new(
            resolved.id,
            resolved.handle,
            resolved.title,
            caller.user_id,
            Utc::now(),
        );
        if let Err(e) = self.stores.channels.save(&channel).await {
            return store_failure("save channel", &e);
        }
        self.monitor.add_channel(channel.id.clone()).await;
        info!(channel_id = %channel.id, handle = %channel.handle, user_id = %caller.user_id, "channel added");

        format!(
            "✅ Channel @{} added successfully!\nChannel ID: <code>{}</code>\nFeed: {}",
            escape_html(&channel.handle),
            escape_html(&channel.id),
            escape_html(&self.info.feed_url(&channel.id))
        )
    }

    async fn remove_channel(&self, channel_id: &str) -> String {
        let _edit = self.stores.lock_channel_edits().await;
        match self.stores.channels.delete(channel_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return not_found(channel_id),
            Err(e) => return store_failure("remove channel", &e),
        }
        self.monitor.remove_channel(channel_id).await;
        info!(channel_id = %channel_id, "channel removed");
        format!("✅ Channel {} removed successfully!", escape_html(channel_id))
    }

    async fn list_channels(&self) -> String {
        let mut channels = match self.stores.channels.list_all().await {
            Ok(c) => c,
            Err(e) => return store_failure("list channels", &e),
        };
        if channels.is_empty() {
            return "📭 No channels added yet.\nUse /addchannel to add one.".to_string();
        }
        channels.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));

        let mut out = String::from("📋 <b>Monitored Channels:</b>\n\n");
        for (i, ch) in channels.iter().enumerate() {
            let status = if ch.is_active { "✅" } else { "⏸️" };
            let _ = writeln!(
                out,
                "{status} {}. <b>{}</b> (@{})\n   ID: <code>{}</code>\n   Filters: {}",
                i + 1,
                escape_html(&ch.title),
                escape_html(&ch.handle),
                escape_html(&ch.id),
                ch.filters.len()
            );
            for (n, f) in ch.filters.iter().enumerate() {
                let disabled = if f.enabled { "" } else { " (disabled)" };
                let _ = writeln!(
                    out,
                    "      {}. {}: {}{disabled}",
                    n + 1,
                    f.kind,
                    escape_html(&f.keywords.join(", "))
                );
            }
            out.push('\n');
        }
        out
    }

    async fn add_filter(&self, channel_id: &str, filter: Filter) -> String {
        let _edit = self.stores.lock_channel_edits().await;
        let mut channel = match self.stores.channels.get(channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return not_found(channel_id),
            Err(e) => return store_failure("load channel", &e),
        };
        let summary = format!("{}: {}", filter.kind, filter.keywords.join(", "));
        channel.filters.push(filter);
        if let Err(e) = self.stores.channels.save(&channel).await {
            return store_failure("save filter", &e);
        }
        info!(channel_id = %channel_id, filters = channel.filters.len(), "filter added");
        format!(
            "✅ Filter {} added to channel {}\n{}",
            channel.filters.len(),
            escape_html(channel_id),
            escape_html(&summary)
        )
    }

    async fn remove_filter(&self, channel_id: &str, index: usize) -> String {
        let _edit = self.stores.lock_channel_edits().await;
        let mut channel = match self.stores.channels.get(channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return not_found(channel_id),
            Err(e) => return store_failure("load channel", &e),
        };
        if index == 0 || index > channel.filters.len() {
            return "❌ Filter number out of range".to_string();
        }
        channel.filters.remove(index - 1);
        if let Err(e) = self.stores.channels.save(&channel).await {
            return store_failure("remove filter", &e);
        }
        info!(channel_id = %channel_id, index, "filter removed");
        format!(
            "✅ Filter {index} removed from channel {}",
            escape_html(channel_id)
        )
    }

    async fn set_active(&self, channel_id: &str, active: bool) -> String {
        let _edit = self.stores.lock_channel_edits().await;
        let mut channel = match self.stores.channels.get(channel_id).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return not_found(channel_id),
            Err(e) => return store_failure("load channel", &e),
        };
        if channel.is_active != active {
            channel.is_active = active;
            if let Err(e) = self.stores.channels.save(&channel).await {
                return store_failure("update channel", &e);
            }
        }
        if active {
            self.monitor.add_channel(channel.id.clone()).await;
            format!("▶️ Channel {} resumed", escape_html(channel_id))
        } else {
            self.monitor.remove_channel(&channel.id).await;
            format!("⏸️ Channel {} paused", escape_html(channel_id))
        }
    }

    async fn rss_link(&self, channel_id: Option<&str>) -> String {
        if let Some(channel_id) = channel_id {
            return match self.stores.channels.get(channel_id).await {
                Ok(ch) => format!(
                    "🔗 RSS feed for @{}:\n{}",
                    escape_html(&ch.handle),
                    escape_html(&self.info.feed_url(&ch.id))
                ),
                Err(e) if e.is_not_found() => not_found(channel_id),
                Err(e) => store_failure("load channel", &e),
            };
        }

        let mut channels = match self.stores.channels.list_all().await {
            Ok(c) => c,
            Err(e) => return store_failure("list channels", &e),
        };
        if channels.is_empty() {
            return "📭 No channels added yet.\nUse /addchannel to add one.".to_string();
        }
        channels.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));

        let mut out = String::from("🔗 <b>RSS Feed Links:</b>\n\n");
        for ch in &channels {
            let _ = writeln!(
                out,
                "@{}:\n{}\n",
                escape_html(&ch.handle),
                escape_html(&self.info.feed_url(&ch.id))
            );
        }
        out
    }

    async fn status(&self) -> String {
        let channels = match self.stores.channels.list_all().await {
            Ok(c) => c,
            Err(e) => return store_failure("load status", &e),
        };
        let active = channels.iter().filter(|c| c.is_active).count();
        let monitored = self.monitor.active_channels().await.len();

        format!(
            "📊 <b>Bot Status:</b>\n\nChannels: {} (Active: {active})\nMonitored: {monitored}\nUpdate Interval: {} seconds\nHTTP Port: {}\nStorage: {}",
            channels.len(),
            self.info.update_interval.as_secs(),
            self.info.http_port,
            escape_html(&self.info.storage_path)
        )
    }
}

fn not_found(channel_id: &str) -> String {
    format!("❌ Channel not found: {}", escape_html(channel_id))
}

fn store_failure(action: &str, e: &crate::store::StoreError) -> String {
    error!(error = %e, "failed to {action}");
    format!("❌ Failed to {action}: {}", escape_html(&e.to_string()))
}
