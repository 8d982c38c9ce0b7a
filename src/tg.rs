use std::sync::Arc;

use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    prelude::*,
    types::{CallbackQuery, ChatId, MessageId, ParseMode, User},
    utils::command::BotCommands,
    ApiError, RequestError,
};
use tracing::{debug, info, warn};

use crate::config::Links;
use crate::format::{escape_markdown, format_results, welcome};
use crate::keyboards::{episodes_keyboard, pagination_keyboard, parse_view_tv, seasons_keyboard, CallbackAction};
use crate::session::{Browsing, Conversation, SearchOutcome, SessionStore};
use crate::tmdb::{MediaKind, TmdbClient};

const NOT_FOUND_MOVIE: &str =
    "No movies were found with that name 😕\nPlease make sure you didn’t include the year or any extra information 🎬✨";
const NOT_FOUND_TV: &str =
    "No TV shows were found with that name 😕\nPlease make sure you didn’t include the year or any extra information 📺✨";
const IDLE_HINT: &str = "Send /movie or /tv_show first, then enter the title 🎬";

/// Everything the handlers share, built once at startup.
pub struct App {
    pub tmdb: TmdbClient,
    pub sessions: SessionStore,
    pub links: Links,
}

/* ====== Commands ====== */
#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Commands:")]
enum Command {
    #[command(description = "start the bot")]
    Start(String),
    #[command(description = "search for a movie")]
    Movie,
    #[command(description = "search for a movie (same as /movie)")]
    Search,
    #[command(description = "search for a TV show")]
    TvShow,
    #[command(description = "show this help")]
    Help,
}

/// Show id carried by a `/view_tv_<id>` message.
#[derive(Clone, Copy, Debug)]
struct ViewTv(u64);

pub async fn run(bot: Bot, app: Arc<App>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(on_command))
                .branch(
                    dptree::filter_map(|msg: Message| msg.text().and_then(parse_view_tv).map(ViewTv))
                        .endpoint(on_view_tv),
                )
                .branch(dptree::endpoint(on_text)),
        )
        .branch(Update::filter_callback_query().endpoint(on_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_command(bot: Bot, msg: Message, cmd: Command, app: Arc<App>) -> ResponseResult<()> {
    let user = who(msg.from.as_ref());
    match cmd {
        Command::Start(payload) => {
            info!(%user, action = "/start", payload = %payload, "interaction");
            let first_name = msg.from.as_ref().map(|u| u.first_name.as_str()).unwrap_or("there");
            let text = welcome(first_name);
            bot.send_message(msg.chat.id, &text).parse_mode(ParseMode::MarkdownV2).await?;
            debug!(%user, reply = %text, "bot reply");
        }
        Command::Help => {
            info!(%user, action = "/help", "interaction");
            let text = Command::descriptions().to_string();
            bot.send_message(msg.chat.id, &text).await?;
            debug!(%user, reply = %text, "bot reply");
        }
        Command::Movie | Command::Search => await_query(&bot, msg.chat.id, &app, MediaKind::Movie, &user).await?,
        Command::TvShow => await_query(&bot, msg.chat.id, &app, MediaKind::Tv, &user).await?,
    }
    Ok(())
}

async fn await_query(bot: &Bot, chat: ChatId, app: &App, kind: MediaKind, user: &str) -> ResponseResult<()> {
    let (action, prompt) = match kind {
        MediaKind::Movie => ("/movie", "Please enter the name of the movie you’re looking for: 🎥\n(Movie title only)"),
        MediaKind::Tv => ("/tv_show", "Please enter the name of the TV show you’re looking for: 📺\n(Show title only)"),
    };
    info!(user, action, "interaction");
    app.sessions.set(chat, Conversation::AwaitingQuery(kind)).await;
    bot.send_message(chat, prompt).await?;
    debug!(user, reply = prompt, "bot reply");
    Ok(())
}

/* ====== Free text ====== */
async fn on_text(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    let Some(query) = msg.text().map(str::trim) else { return Ok(()) };
    if query.is_empty() {
        return Ok(());
    }
    let chat = msg.chat.id;
    let user = who(msg.from.as_ref());

    let Some(Conversation::AwaitingQuery(kind)) = app.sessions.get(chat).await else {
        debug!(%user, "text outside of a search");
        bot.send_message(chat, IDLE_HINT).await?;
        debug!(%user, reply = IDLE_HINT, "bot reply");
        return Ok(());
    };
    info!(%user, action = %format!("search for '{query}'"), ?kind, "interaction");

    let found = match kind {
        MediaKind::Movie => app.tmdb.search_movies(query).await,
        MediaKind::Tv => app.tmdb.search_tv(query).await,
    };
    match app.sessions.finish_search(chat, kind, found).await {
        SearchOutcome::Found(browsing) => {
            let (text, kb) = render_page(&browsing, &app.links);
            bot.send_message(chat, &text)
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(kb)
                .await?;
            debug!(%user, reply = %text, "bot reply");
        }
        SearchOutcome::NoResults(kind) => {
            let text = match kind {
                MediaKind::Movie => NOT_FOUND_MOVIE,
                MediaKind::Tv => NOT_FOUND_TV,
            };
            bot.send_message(chat, text).await?;
            debug!(%user, reply = text, "bot reply");
        }
        SearchOutcome::Failed(e) => {
            warn!(%user, error = %e, "search failed");
            let text = e.to_string();
            bot.send_message(chat, &text).await?;
            debug!(%user, reply = %text, "bot reply");
        }
    }
    Ok(())
}

/* ====== TV seasons ====== */
async fn on_view_tv(bot: Bot, msg: Message, view: ViewTv, app: Arc<App>) -> ResponseResult<()> {
    let ViewTv(tv_id) = view;
    let user = who(msg.from.as_ref());
    info!(%user, action = %format!("/view_tv_{tv_id}"), "interaction");
    let chat = msg.chat.id;

    let text = match app.tmdb.tv_details(tv_id).await {
        Ok(Some(details)) if details.seasons.iter().any(|s| s.episode_count > 0) => {
            let text = format!("*{}*\nChoose a season:", escape_markdown(&details.name));
            bot.send_message(chat, &text)
                .parse_mode(ParseMode::MarkdownV2)
                .reply_markup(seasons_keyboard(&details))
                .await?;
            text
        }
        Ok(Some(_)) => {
            let text = "This show has no episodes listed yet 📺".to_string();
            bot.send_message(chat, &text).await?;
            text
        }
        Ok(None) => {
            let text = "TV show not found 😕".to_string();
            bot.send_message(chat, &text).await?;
            text
        }
        Err(e) => {
            warn!(tv_id, error = %e, "tv details failed");
            let text = e.to_string();
            bot.send_message(chat, &text).await?;
            text
        }
    };
    debug!(%user, reply = %text, "bot reply");
    Ok(())
}

/* ====== Callback buttons ======
   next_<p> / prev_<p>       — show result page p
   season_<tv>_<n>[_<eps>]   — list episode links */
async fn on_callback(bot: Bot, q: CallbackQuery, app: Arc<App>) -> ResponseResult<()> {
    let user = who(Some(&q.from));
    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };
    let chat = message.chat().id;
    info!(%user, action = %format!("{data} callback"), "interaction");
    // acknowledge before acting
    bot.answer_callback_query(q.id.clone()).await?;

    match CallbackAction::parse(data) {
        Some(CallbackAction::Page(page)) => match app.sessions.turn_page(chat, page).await {
            Some(browsing) => show_page(&bot, chat, message.id(), &browsing, &app.links, &user).await?,
            None => debug!(%user, page, "page out of range or no results stored"),
        },
        Some(CallbackAction::Season { tv_id, season, episodes }) => {
            let count = match episodes {
                Some(n) => Some(n),
                None => episode_count(&app.tmdb, tv_id, season).await,
            };
            match count.filter(|n| *n > 0) {
                Some(n) => {
                    let text = format!("Season {season}: choose an episode");
                    bot.send_message(chat, &text)
                        .reply_markup(episodes_keyboard(tv_id, season, n, &app.links))
                        .await?;
                    debug!(%user, reply = %text, "bot reply");
                }
                None => {
                    let text = "Couldn't load the episodes of this season 😕";
                    bot.send_message(chat, text).await?;
                    debug!(%user, reply = text, "bot reply");
                }
            }
        }
        None => debug!(%user, data, "unknown callback"),
    }
    Ok(())
}

async fn episode_count(tmdb: &TmdbClient, tv_id: u64, season: u32) -> Option<u32> {
    match tmdb.tv_details(tv_id).await {
        Ok(details) => details?.season(season).map(|s| s.episode_count),
        Err(e) => {
            warn!(tv_id, error = %e, "tv details failed");
            None
        }
    }
}

async fn show_page(
    bot: &Bot,
    chat: ChatId,
    message: MessageId,
    browsing: &Browsing,
    links: &Links,
    user: &str,
) -> ResponseResult<()> {
    let (text, kb) = render_page(browsing, links);
    let edited = bot
        .edit_message_text(chat, message, &text)
        .parse_mode(ParseMode::MarkdownV2)
        .reply_markup(kb)
        .await;
    match edited {
        Ok(_) => {
            debug!(user, page = browsing.page, reply = %text, "bot reply");
            Ok(())
        }
        // a stale button pointing at the page already on screen
        Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn render_page(browsing: &Browsing, links: &Links) -> (String, teloxide::types::InlineKeyboardMarkup) {
    (
        format_results(browsing.current(), browsing.first_rank(), links),
        pagination_keyboard(browsing.page, browsing.total_pages()),
    )
}

fn who(user: Option<&User>) -> String {
    match user {
        Some(User { username: Some(name), .. }) => name.clone(),
        Some(u) => u.id.to_string(),
        None => "unknown".to_string(),
    }
}
