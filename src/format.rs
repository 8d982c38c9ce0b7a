//! Text rendering: MarkdownV2 search pages for the bot, HTML captions for the
//! channel and plain notes for Nostr. Stored data is never escaped; escaping
//! happens once, here, at render time.

use unicode_segmentation::UnicodeSegmentation;

use crate::config::Links;
use crate::tmdb::{MediaKind, ResultItem};

pub const PAGE_SIZE: usize = 5;

/// Telegram rejects photo captions longer than this.
const CAPTION_LIMIT: usize = 1024;

const MARKDOWN_SPECIALS: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Prefixes every MarkdownV2-significant character with a backslash.
/// Not idempotent.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for ch in text.chars() {
        if MARKDOWN_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Cuts `s` to at most `max` grapheme clusters, marking the cut with `…`.
pub fn clip(s: &str, max: usize) -> String {
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() <= max {
        s.to_string()
    } else {
        let mut out: String = graphemes[..max.saturating_sub(1)].concat();
        out.push('…');
        out
    }
}

pub fn total_pages(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE)
}

/// Items shown on page `page`, or `None` when the page does not exist.
pub fn page_slice(results: &[ResultItem], page: usize) -> Option<&[ResultItem]> {
    if page >= total_pages(results.len()) {
        return None;
    }
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(results.len());
    Some(&results[start..end])
}

/// Renders one page of results as MarkdownV2. `first_rank` is the 1-based
/// position of the first item in the whole result set.
pub fn format_results(items: &[ResultItem], first_rank: usize, links: &Links) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let title = match item.year() {
            Some(year) => format!("{} ({})", item.title, year),
            None => format!("{} (N/A)", item.title),
        };
        let overview = if item.overview.trim().is_empty() {
            "No overview".to_string()
        } else {
            item.overview.clone()
        };
        let rating = format!("{:.1} ({} votes)", item.vote_average, item.vote_count);

        out.push_str(&format!("*{}\\.* __{}__\n", first_rank + i, escape_markdown(&title)));
        out.push_str(&format!("*Overview:* _{}_\n", escape_markdown(&overview)));
        out.push_str(&format!("*Rating:* {}\n", escape_markdown(&rating)));
        out.push_str(&format!(
            "*Original language:* {}\n",
            escape_markdown(&item.original_language)
        ));
        match item.kind {
            MediaKind::Movie => out.push_str(&format!(
                "[Watch here]({}) \\| [TG Channel]({})\n\n",
                link_target(&links.watch_movie(item.id)),
                link_target(&links.channel)
            )),
            MediaKind::Tv => out.push_str(&format!(
                "{} \\| [TG Channel]({})\n\n",
                escape_markdown(&format!("Seasons: /view_tv_{}", item.id)),
                link_target(&links.channel)
            )),
        }
    }
    out
}

/// Inside `(...)` of an inline link only `)` and `\` must be escaped.
fn link_target(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

pub fn welcome(first_name: &str) -> String {
    format!(
        "Hello, *{}*, You’re using a bot for searching movies and TV shows 🎬\n\
         Send /movie to search for a movie or /tv\\_show to search for a TV show, then enter the title",
        escape_markdown(first_name)
    )
}

/// Everything a sink needs to publish one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub item: ResultItem,
    pub trailer_url: Option<String>,
    pub genres: Vec<String>,
}

impl Post {
    pub fn hashtags(&self) -> String {
        let mut tags = String::from("#movies #free #hd");
        for genre in &self.genres {
            tags.push_str(" #");
            tags.extend(genre.chars().filter(|c| !c.is_whitespace()));
        }
        tags
    }

    fn year(&self) -> &str {
        self.item.year().unwrap_or("N/A")
    }
}

/// HTML caption for the channel photo post, clipped to Telegram's limit by
/// shortening the overview.
pub fn channel_caption(post: &Post, links: &Links) -> String {
    let render = |overview: &str| {
        let mut text = format!(
            "🎬 <u><b>{}</b></u> ({})\n\n📄<b>Overview:</b> <i>{}</i>\n⭐<b>Rating:</b> {:.1} ({} votes)\n\n{}\n\n\
             🎥<a href='{}'>Watch here</a> | <a href='{}?start=1'>Search Movies</a>",
            html_escape(&post.item.title),
            post.year(),
            html_escape(overview),
            post.item.vote_average,
            post.item.vote_count,
            html_escape(&post.hashtags()),
            html_escape(&links.watch_movie(post.item.id)),
            html_escape(&links.bot),
        );
        if let Some(trailer) = &post.trailer_url {
            text.push_str(&format!(" | <a href='{}'>Trailer</a>", html_escape(trailer)));
        }
        text
    };

    let full = render(&post.item.overview);
    let visible = visible_len(&full);
    if visible <= CAPTION_LIMIT {
        return full;
    }
    let overview_len = post.item.overview.graphemes(true).count();
    let keep = overview_len.saturating_sub(visible - CAPTION_LIMIT);
    render(&clip(&post.item.overview, keep))
}

/// Length Telegram counts for an HTML caption: text only, tags and entities excluded.
fn visible_len(html: &str) -> usize {
    let mut count = 0;
    let mut in_tag = false;
    let mut in_entity = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => {
                in_entity = true;
                count += 1;
            }
            ';' if in_entity => in_entity = false,
            _ if in_tag || in_entity => {}
            _ => count += ch.len_utf16(),
        }
    }
    count
}

/// Plain-text note for Nostr.
pub fn nostr_note(post: &Post, links: &Links, image_base: &str) -> String {
    let mut text = format!(
        "🎬 {} ({})\n\n📄Overview: {}\n⭐Rating: {:.1} ({} votes)\n\n{}\n\n🎥Watch here: {}\nSearch Movies Telegram: {}",
        post.item.title,
        post.year(),
        post.item.overview,
        post.item.vote_average,
        post.item.vote_count,
        post.hashtags(),
        links.watch_movie(post.item.id),
        links.bot,
    );
    if let Some(trailer) = &post.trailer_url {
        text.push_str(&format!("\nTrailer: {trailer}"));
    }
    if let Some(backdrop) = &post.item.backdrop_path {
        text.push_str(&format!("\n{image_base}{backdrop}"));
    }
    text
}

#[cfg(test)]
pub(crate) fn item(id: u64, title: &str) -> ResultItem {
    ResultItem {
        id,
        title: title.to_string(),
        overview: format!("About {title}."),
        release_date: "2010-07-15".to_string(),
        vote_average: 8.44,
        vote_count: 100,
        original_language: "en".to_string(),
        backdrop_path: Some("/back.jpg".to_string()),
        genre_ids: vec![],
        kind: MediaKind::Movie,
    }
}
