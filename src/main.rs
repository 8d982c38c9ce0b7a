mod config;
mod content;
mod format;
mod keyboards;
mod publish;
mod session;
mod storage;
mod tg;
mod tmdb;

use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::content::ContentLoop;
use crate::publish::{load_relays, NostrSink, Publisher, TelegramChannel};
use crate::session::SessionStore;
use crate::storage::RecentPosts;
use crate::tmdb::TmdbClient;

const MAX_SESSIONS: u64 = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let tmdb = TmdbClient::new(config.tmdb_base_url.clone(), config.tmdb_auth.clone(), config.http_timeout)?;

    let shutdown = CancellationToken::new();
    let content = if config.content_loop_enabled {
        let ledger = RecentPosts::load(&config.recent_posts_file, config.recent_posts_capacity).await?;
        let relays = load_relays(&config.relays_file).await;
        let sinks: Vec<Box<dyn Publisher>> = vec![
            Box::new(TelegramChannel::new(&config.channel, config.links.clone())),
            Box::new(NostrSink::new(config.nostr_secret.clone(), relays, config.links.clone())),
        ];
        let content = ContentLoop::new(tmdb.clone(), ledger, sinks);
        Some(tokio::spawn(content.run(shutdown.clone())))
    } else {
        info!("content loop disabled, set CONTENT_LOOP_ENABLED=true to publish posts");
        None
    };

    let app = Arc::new(tg::App {
        tmdb,
        sessions: SessionStore::new(config.session_ttl, MAX_SESSIONS),
        links: config.links.clone(),
    });
    let bot = Bot::new(config.bot_token.clone());
    info!("bot is running");
    tg::run(bot, app).await;

    shutdown.cancel();
    if let Some(handle) = content {
        handle.await?;
    }
    Ok(())
}
