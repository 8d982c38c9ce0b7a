use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use teloxide::types::ChatId;

use crate::format::{page_slice, total_pages};
use crate::tmdb::{MediaKind, ResultItem, TmdbError};

/// Where a chat is in the search flow. A chat with no entry is idle.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversation {
    AwaitingQuery(MediaKind),
    Browsing(Browsing),
}

/// A result set on display and the page currently shown.
#[derive(Debug, Clone, PartialEq)]
pub struct Browsing {
    pub kind: MediaKind,
    pub results: Arc<Vec<ResultItem>>,
    pub page: usize,
}

impl Browsing {
    /// `None` for an empty result set; there is nothing to browse.
    pub fn new(kind: MediaKind, results: Vec<ResultItem>) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        Some(Self { kind, results: Arc::new(results), page: 0 })
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.results.len())
    }

    pub fn current(&self) -> &[ResultItem] {
        page_slice(&self.results, self.page).unwrap_or_default()
    }

    /// 1-based rank of the first item on the current page.
    pub fn first_rank(&self) -> usize {
        self.page * crate::format::PAGE_SIZE + 1
    }

    /// Moves to `page` if it exists; out-of-range targets leave the state alone.
    pub fn goto(&mut self, page: usize) -> bool {
        if page < self.total_pages() {
            self.page = page;
            true
        } else {
            false
        }
    }
}

/// What a finished search left the chat with.
#[derive(Debug)]
pub enum SearchOutcome {
    Found(Browsing),
    NoResults(MediaKind),
    Failed(TmdbError),
}

/// Per-chat conversation state with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache<ChatId, Conversation>,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(idle_ttl)
            .build();
        Self { cache }
    }

    pub async fn get(&self, chat: ChatId) -> Option<Conversation> {
        self.cache.get(&chat).await
    }

    pub async fn set(&self, chat: ChatId, conversation: Conversation) {
        self.cache.insert(chat, conversation).await;
    }

    pub async fn clear(&self, chat: ChatId) {
        self.cache.invalidate(&chat).await;
    }

    /// Stores a successful search as page 0 of a new result set. An empty
    /// result set or a failed request puts the chat back to idle.
    pub async fn finish_search(
        &self,
        chat: ChatId,
        kind: MediaKind,
        found: Result<Vec<ResultItem>, TmdbError>,
    ) -> SearchOutcome {
        let outcome = match found {
            Ok(results) => match Browsing::new(kind, results) {
                Some(browsing) => SearchOutcome::Found(browsing),
                None => SearchOutcome::NoResults(kind),
            },
            Err(e) => SearchOutcome::Failed(e),
        };
        match &outcome {
            SearchOutcome::Found(browsing) => self.set(chat, Conversation::Browsing(browsing.clone())).await,
            SearchOutcome::NoResults(_) | SearchOutcome::Failed(_) => self.clear(chat).await,
        }
        outcome
    }

    /// Applies a page move to the chat's result set. Returns the updated state
    /// when the move happened, `None` when there is nothing to browse or the
    /// page is out of range.
    pub async fn turn_page(&self, chat: ChatId, page: usize) -> Option<Browsing> {
        let Some(Conversation::Browsing(mut browsing)) = self.get(chat).await else {
            return None;
        };
        if !browsing.goto(page) {
            return None;
        }
        self.set(chat, Conversation::Browsing(browsing.clone())).await;
        Some(browsing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::item;

    fn browsing(n: u64) -> Browsing {
        Browsing::new(MediaKind::Movie, (1..=n).map(|i| item(i, "x")).collect()).unwrap()
    }

    #[test]
    fn empty_results_do_not_browse() {
        assert!(Browsing::new(MediaKind::Movie, vec![]).is_none());
    }

    #[test]
    fn goto_validates_range() {
        let mut b = browsing(7);
        assert_eq!(b.total_pages(), 2);
        assert!(b.goto(1));
        assert_eq!(b.current().iter().map(|i| i.id).collect::<Vec<_>>(), vec![6, 7]);
        assert_eq!(b.first_rank(), 6);
        assert!(!b.goto(2));
        assert_eq!(b.page, 1);
    }

    #[tokio::test]
    async fn turn_page_updates_store_and_ignores_bad_pages() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let chat = ChatId(1);
        store.set(chat, Conversation::Browsing(browsing(12))).await;

        let moved = store.turn_page(chat, 2).await.unwrap();
        assert_eq!(moved.page, 2);
        assert!(store.turn_page(chat, 3).await.is_none());
        assert!(store.turn_page(chat, usize::MAX).await.is_none());
        match store.get(chat).await {
            Some(Conversation::Browsing(b)) => assert_eq!(b.page, 2),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_hit_starts_browsing_at_page_zero() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let chat = ChatId(3);
        store.set(chat, Conversation::AwaitingQuery(MediaKind::Tv)).await;

        let results = (1..=6).map(|i| item(i, "x")).collect();
        let outcome = store.finish_search(chat, MediaKind::Tv, Ok(results)).await;
        let SearchOutcome::Found(shown) = outcome else { panic!("expected results") };
        assert_eq!(shown.page, 0);
        assert_eq!(shown.kind, MediaKind::Tv);
        assert_eq!(shown.total_pages(), 2);
        assert_eq!(store.get(chat).await, Some(Conversation::Browsing(shown)));
    }

    #[tokio::test]
    async fn empty_search_resets_to_idle() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let chat = ChatId(4);
        store.set(chat, Conversation::AwaitingQuery(MediaKind::Movie)).await;

        let outcome = store.finish_search(chat, MediaKind::Movie, Ok(vec![])).await;
        assert!(matches!(outcome, SearchOutcome::NoResults(MediaKind::Movie)));
        assert!(store.get(chat).await.is_none());
    }

    #[tokio::test]
    async fn failed_search_resets_to_idle_and_drops_old_results() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let chat = ChatId(5);
        store.set(chat, Conversation::Browsing(browsing(3))).await;

        let err = TmdbError::Decode(serde_json::from_str::<u8>("x").unwrap_err());
        let outcome = store.finish_search(chat, MediaKind::Movie, Err(err)).await;
        let SearchOutcome::Failed(e) = outcome else { panic!("expected a failure") };
        assert_eq!(e.to_string(), "Failed to decode JSON response.");
        assert!(store.get(chat).await.is_none());
        assert!(store.turn_page(chat, 0).await.is_none());
    }

    #[tokio::test]
    async fn turn_page_without_results_is_noop() {
        let store = SessionStore::new(Duration::from_secs(60), 100);
        let chat = ChatId(2);
        assert!(store.turn_page(chat, 0).await.is_none());

        store.set(chat, Conversation::AwaitingQuery(MediaKind::Tv)).await;
        assert!(store.turn_page(chat, 0).await.is_none());
        assert_eq!(store.get(chat).await, Some(Conversation::AwaitingQuery(MediaKind::Tv)));

        store.clear(chat).await;
        assert!(store.get(chat).await.is_none());
    }
}
