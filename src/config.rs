use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3/";
const DEFAULT_WATCH_BASE_URL: &str = "https://www.vidking.net/embed";
const DEFAULT_CHANNEL_LINK: &str = "https://t.me/movies4free21";
const DEFAULT_BOT_LINK: &str = "https://t.me/Movies4Free21Bot";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is missing")]
    Missing(&'static str),
    #[error("either TMDB_ACCESS_TOKEN or TMDB_API_KEY must be set")]
    MissingTmdbCredential,
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// How requests to the metadata provider are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TmdbAuth {
    /// v4 read access token, sent as `Authorization: Bearer`.
    Bearer(String),
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
}

/// Links embedded in rendered results and posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    pub watch_base: String,
    pub channel: String,
    pub bot: String,
}

impl Links {
    pub fn watch_movie(&self, id: u64) -> String {
        format!("{}/movie/{}", self.watch_base, id)
    }

    pub fn watch_episode(&self, tv_id: u64, season: u32, episode: u32) -> String {
        format!("{}/tv/{}/{}/{}", self.watch_base, tv_id, season, episode)
    }
}

impl Default for Links {
    fn default() -> Self {
        Self {
            watch_base: DEFAULT_WATCH_BASE_URL.to_string(),
            channel: DEFAULT_CHANNEL_LINK.to_string(),
            bot: DEFAULT_BOT_LINK.to_string(),
        }
    }
}

/// Credentials for the channel publishing sink. Both halves are optional so the
/// sink can report exactly what is absent at post time.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub bot_token: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub tmdb_auth: TmdbAuth,
    pub tmdb_base_url: String,
    pub http_timeout: Duration,
    pub channel: ChannelConfig,
    pub nostr_secret: Option<String>,
    pub relays_file: PathBuf,
    pub recent_posts_file: PathBuf,
    pub recent_posts_capacity: usize,
    pub session_ttl: Duration,
    pub content_loop_enabled: bool,
    pub links: Links,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("TOKEN_TG_BOT_MOVIES").ok_or(ConfigError::Missing("TOKEN_TG_BOT_MOVIES"))?;

        let tmdb_auth = match (get("TMDB_ACCESS_TOKEN"), get("TMDB_API_KEY")) {
            (Some(token), _) => TmdbAuth::Bearer(token),
            (None, Some(key)) => TmdbAuth::ApiKey(key),
            (None, None) => return Err(ConfigError::MissingTmdbCredential),
        };

        let mut tmdb_base_url = get("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_TMDB_BASE_URL.to_string());
        if !tmdb_base_url.ends_with('/') {
            tmdb_base_url.push('/');
        }

        let links = Links {
            watch_base: get("WATCH_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_WATCH_BASE_URL.to_string()),
            channel: get("CHANNEL_LINK").unwrap_or_else(|| DEFAULT_CHANNEL_LINK.to_string()),
            bot: get("BOT_LINK").unwrap_or_else(|| DEFAULT_BOT_LINK.to_string()),
        };

        Ok(Self {
            bot_token,
            tmdb_auth,
            tmdb_base_url,
            http_timeout: Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS", 15)?),
            channel: ChannelConfig {
                bot_token: get("TOKEN_TG_BOT_POSTER"),
                channel: get("CHANNEL_TG"),
            },
            nostr_secret: get("NOSTR_PRIVATE_KEY"),
            relays_file: get("RELAYS_FILE").unwrap_or_else(|| "relays.txt".to_string()).into(),
            recent_posts_file: get("RECENT_POSTS_FILE")
                .unwrap_or_else(|| "recent_posts.txt".to_string())
                .into(),
            recent_posts_capacity: parse_or(get("RECENT_POSTS_CAPACITY"), "RECENT_POSTS_CAPACITY", 20)?,
            session_ttl: Duration::from_secs(parse_or(get("SESSION_TTL_SECS"), "SESSION_TTL_SECS", 3600)?),
            content_loop_enabled: parse_flag(get("CONTENT_LOOP_ENABLED"), "CONTENT_LOOP_ENABLED")?,
            links,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_flag(raw: Option<String>, name: &'static str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid { name, value: raw.unwrap_or_default() }),
    }
}
