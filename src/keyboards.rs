use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::Links;
use crate::tmdb::TvDetails;

const SEASONS_PER_ROW: usize = 2;
const EPISODES_PER_ROW: usize = 5;
/// Telegram caps an inline keyboard at 100 buttons.
const MAX_BUTTONS: usize = 100;

static VIEW_TV: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/view_tv_(\d+)(?:@\w+)?$").expect("valid regex"));

/* ====== Callback payloads ======
   next_<page> / prev_<page>               — show result page <page>
   season_<tv>_<season>[_<episode_count>]  — list episodes of a season */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Page(usize),
    Season { tv_id: u64, season: u32, episodes: Option<u32> },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split('_');
        match parts.next()? {
            "next" | "prev" => {
                let page = parts.next()?.parse().ok()?;
                parts.next().is_none().then_some(Self::Page(page))
            }
            "season" => {
                let tv_id = parts.next()?.parse().ok()?;
                let season = parts.next()?.parse().ok()?;
                let episodes = match parts.next() {
                    Some(raw) => Some(raw.parse().ok()?),
                    None => None,
                };
                parts.next().is_none().then_some(Self::Season { tv_id, season, episodes })
            }
            _ => None,
        }
    }
}

/// Show id from a `/view_tv_<id>` message.
pub fn parse_view_tv(text: &str) -> Option<u64> {
    VIEW_TV.captures(text.trim())?.get(1)?.as_str().parse().ok()
}

/// "Prev"/"Next" row for `page`; a direction is omitted when it would leave
/// the result set.
pub fn pagination_keyboard(page: usize, total_pages: usize) -> InlineKeyboardMarkup {
    let mut row = Vec::new();
    if page > 0 {
        row.push(InlineKeyboardButton::callback("⬅️ Prev", format!("prev_{}", page - 1)));
    }
    if page + 1 < total_pages {
        row.push(InlineKeyboardButton::callback("Next ➡️", format!("next_{}", page + 1)));
    }
    let rows = if row.is_empty() { vec![] } else { vec![row] };
    InlineKeyboardMarkup::new(rows)
}

/// One button per season that has episodes.
pub fn seasons_keyboard(details: &TvDetails) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = details
        .seasons
        .iter()
        .filter(|s| s.episode_count > 0)
        .take(MAX_BUTTONS)
        .map(|s| {
            let label = if s.name.trim().is_empty() { format!("Season {}", s.season_number) } else { s.name.clone() };
            InlineKeyboardButton::callback(
                format!("{label} ({} ep.)", s.episode_count),
                format!("season_{}_{}_{}", details.id, s.season_number, s.episode_count),
            )
        })
        .collect();
    InlineKeyboardMarkup::new(buttons.chunks(SEASONS_PER_ROW).map(<[_]>::to_vec))
}

/// Direct watch links for episodes `1..=episode_count`.
pub fn episodes_keyboard(tv_id: u64, season: u32, episode_count: u32, links: &Links) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = (1..=episode_count)
        .take(MAX_BUTTONS)
        .filter_map(|ep| {
            let url = Url::parse(&links.watch_episode(tv_id, season, ep)).ok()?;
            Some(InlineKeyboardButton::url(format!("Ep {ep}"), url))
        })
        .collect();
    InlineKeyboardMarkup::new(buttons.chunks(EPISODES_PER_ROW).map(<[_]>::to_vec))
}
