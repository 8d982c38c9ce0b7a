use std::path::Path;

use async_trait::async_trait;
use nostr_sdk::prelude::{Client, EventBuilder, Keys};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode, Recipient};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ChannelConfig, Links};
use crate::format::{channel_caption, nostr_note, Post};

pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original";

pub const DEFAULT_RELAYS: &[&str] = &["wss://relay.damus.io", "wss://nostr.wine"];

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("telegram: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("nostr: {0}")]
    Nostr(String),
    #[error("invalid image url: {0}")]
    ImageUrl(String),
}

/// What a sink did with a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(&'static str),
}

/// An external target that posts go to.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, post: &Post) -> Result<Delivery, PublishError>;
}

/* ====== Telegram channel ====== */

pub struct TelegramChannel {
    target: Option<(Bot, Recipient)>,
    links: Links,
}

impl TelegramChannel {
    pub fn new(config: &ChannelConfig, links: Links) -> Self {
        let target = match (&config.bot_token, &config.channel) {
            (Some(token), Some(channel)) => Some((Bot::new(token), parse_recipient(channel))),
            _ => None,
        };
        Self { target, links }
    }
}

/// `-100…` ids go by number, anything else is treated as `@username`.
fn parse_recipient(channel: &str) -> Recipient {
    match channel.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = channel.trim_start_matches('@');
            Recipient::ChannelUsername(format!("@{name}"))
        }
    }
}

#[async_trait]
impl Publisher for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn publish(&self, post: &Post) -> Result<Delivery, PublishError> {
        let Some((bot, channel)) = &self.target else {
            warn!("poster bot token or channel id is not set, skipping channel post");
            return Ok(Delivery::Skipped("channel sink is not configured"));
        };
        let Some(backdrop) = &post.item.backdrop_path else {
            info!(id = post.item.id, "no picture, skip");
            return Ok(Delivery::Skipped("item has no backdrop"));
        };
        let image = reqwest::Url::parse(&format!("{IMAGE_BASE}{backdrop}"))
            .map_err(|e| PublishError::ImageUrl(e.to_string()))?;
        bot.send_photo(channel.clone(), InputFile::url(image))
            .caption(channel_caption(post, &self.links))
            .parse_mode(ParseMode::Html)
            .await?;
        info!(id = post.item.id, title = %post.item.title, "channel post sent");
        Ok(Delivery::Sent)
    }
}

/* ====== Nostr ====== */

pub struct NostrSink {
    secret: Option<String>,
    relays: Vec<String>,
    links: Links,
}

impl NostrSink {
    pub fn new(secret: Option<String>, relays: Vec<String>, links: Links) -> Self {
        Self { secret, relays, links }
    }
}

/// Relay URLs from `path`, one per line; the default set when the file is
/// absent or lists nothing.
pub async fn load_relays(path: &Path) -> Vec<String> {
    let relays: Vec<String> = match tokio::fs::read_to_string(path).await {
        Ok(text) => text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect(),
        Err(_) => Vec::new(),
    };
    if relays.is_empty() {
        DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
    } else {
        relays
    }
}

#[async_trait]
impl Publisher for NostrSink {
    fn name(&self) -> &'static str {
        "nostr"
    }

    async fn publish(&self, post: &Post) -> Result<Delivery, PublishError> {
        let Some(secret) = &self.secret else {
            info!("NOSTR_PRIVATE_KEY not set, skipping Nostr post");
            return Ok(Delivery::Skipped("nostr key is not configured"));
        };
        let keys = Keys::parse(secret).map_err(|e| PublishError::Nostr(e.to_string()))?;
        let client = Client::new(keys);
        for relay in &self.relays {
            if let Err(e) = client.add_relay(relay.as_str()).await {
                warn!(relay, error = %e, "skipping relay");
            }
        }
        client.connect().await;

        let note = nostr_note(post, &self.links, IMAGE_BASE);
        let sent = client.send_event_builder(EventBuilder::text_note(note)).await;
        client.disconnect().await;
        let output = sent.map_err(|e| PublishError::Nostr(e.to_string()))?;
        info!(id = post.item.id, event = %output.val, relays = output.success.len(), "nostr event sent");
        Ok(Delivery::Sent)
    }
}
