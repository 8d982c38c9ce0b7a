//! Background publisher: alternates trending and random picks, skips anything
//! still in the recent-posts ledger, and posts to every sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::format::Post;
use crate::publish::{Delivery, Publisher};
use crate::storage::RecentPosts;
use crate::tmdb::{GenreMap, ResultItem, TmdbClient, TmdbError};

/// Source of candidate items for the loop.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn trending(&self) -> Result<Vec<ResultItem>, TmdbError>;
    async fn discover_total_pages(&self) -> Result<u32, TmdbError>;
    async fn discover_page(&self, page: u32) -> Result<Vec<ResultItem>, TmdbError>;
    async fn trailer_url(&self, movie_id: u64) -> Result<Option<String>, TmdbError>;
    async fn genre_names(&self) -> Result<Arc<GenreMap>, TmdbError>;
}

#[async_trait]
impl Catalog for TmdbClient {
    async fn trending(&self) -> Result<Vec<ResultItem>, TmdbError> {
        self.trending_movies().await
    }

    async fn discover_total_pages(&self) -> Result<u32, TmdbError> {
        TmdbClient::discover_total_pages(self).await
    }

    async fn discover_page(&self, page: u32) -> Result<Vec<ResultItem>, TmdbError> {
        TmdbClient::discover_page(self, page).await
    }

    async fn trailer_url(&self, movie_id: u64) -> Result<Option<String>, TmdbError> {
        TmdbClient::trailer_url(self, movie_id).await
    }

    async fn genre_names(&self) -> Result<Arc<GenreMap>, TmdbError> {
        TmdbClient::genre_names(self).await
    }
}

/// Bounded retries with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 20, delay: Duration::from_secs(2) }
    }
}

/// Pause between iterations: `base` shifted uniformly by up to ±`jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self { base: Duration::from_secs(3 * 60 * 60), jitter: Duration::from_secs(15 * 60) }
    }
}

impl Cadence {
    pub fn next_sleep<R: Rng>(&self, rng: &mut R) -> Duration {
        let jitter = self.jitter.as_secs() as i64;
        let offset = if jitter == 0 { 0 } else { rng.gen_range(-jitter..=jitter) };
        let secs = (self.base.as_secs() as i64 + offset).max(0) as u64;
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Trending,
    Random,
}

impl Strategy {
    fn next(self) -> Self {
        match self {
            Self::Trending => Self::Random,
            Self::Random => Self::Trending,
        }
    }
}

/// First trending item not in the ledger; a random trending item when every
/// one of them was posted recently. `None` only for an empty list.
pub fn pick_unique_trending<R: Rng>(items: &[ResultItem], ledger: &RecentPosts, rng: &mut R) -> Option<ResultItem> {
    if let Some(fresh) = items.iter().find(|m| !ledger.contains(m.id)) {
        info!(id = fresh.id, title = %fresh.title, "found unique trending movie");
        return Some(fresh.clone());
    }
    let fallback = items.choose(rng)?;
    info!(id = fallback.id, "no unique trending movie, falling back to a random one from the list");
    Some(fallback.clone())
}

pub struct ContentLoop<C> {
    catalog: C,
    ledger: RecentPosts,
    sinks: Vec<Box<dyn Publisher>>,
    retry: RetryPolicy,
    cadence: Cadence,
    rng: StdRng,
}

impl<C: Catalog> ContentLoop<C> {
    pub fn new(catalog: C, ledger: RecentPosts, sinks: Vec<Box<dyn Publisher>>) -> Self {
        Self {
            catalog,
            ledger,
            sinks,
            retry: RetryPolicy::default(),
            cadence: Cadence::default(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn ledger(&self) -> &RecentPosts {
        &self.ledger
    }

    /// Runs until `shutdown` is cancelled, starting with the trending strategy.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut strategy = Strategy::Trending;
        info!("content loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.step(strategy) => {}
            }
            let pause = self.cadence.next_sleep(&mut self.rng);
            info!(?pause, next = ?strategy.next(), "content loop sleeping");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            strategy = strategy.next();
        }
        info!("content loop stopped");
    }

    /// One iteration: select with `strategy`, publish, record. Returns the
    /// posted id, or `None` when the iteration was skipped.
    pub async fn step(&mut self, strategy: Strategy) -> Option<u64> {
        let picked = match strategy {
            Strategy::Trending => self.select_trending().await,
            Strategy::Random => self.select_random().await,
        };
        let Some(item) = picked else {
            info!(?strategy, "nothing to post this round");
            return None;
        };
        let id = item.id;
        let post = self.enrich(item).await;
        let delivered = self.publish(&post).await;
        info!(id, ?delivered, "publication attempted");
        if let Err(e) = self.ledger.register(id).await {
            error!(id, error = %e, "failed to persist recent posts");
        }
        Some(id)
    }

    async fn select_trending(&mut self) -> Option<ResultItem> {
        match self.catalog.trending().await {
            Ok(items) => pick_unique_trending(&items, &self.ledger, &mut self.rng),
            Err(e) => {
                warn!(error = %e, "trending request failed");
                None
            }
        }
    }

    /// Up to `retry.max_attempts` random discover picks; the first one not in
    /// the ledger wins.
    pub async fn select_random(&mut self) -> Option<ResultItem> {
        let attempts = self.retry.max_attempts;
        for attempt in 1..=attempts {
            match self.fetch_random().await {
                Ok(Some(item)) if !self.ledger.contains(item.id) => {
                    info!(id = item.id, title = %item.title, attempt, "found unique random movie");
                    return Some(item);
                }
                Ok(Some(item)) => info!(id = item.id, attempt, attempts, "random movie already posted recently"),
                Ok(None) => warn!(attempt, attempts, "random page had no results"),
                Err(e) => warn!(attempt, attempts, error = %e, "failed to fetch random movie"),
            }
            if attempt < attempts && !self.retry.delay.is_zero() {
                tokio::time::sleep(self.retry.delay).await;
            }
        }
        warn!(attempts, "could not find a unique random movie");
        None
    }

    async fn fetch_random(&mut self) -> Result<Option<ResultItem>, TmdbError> {
        let total = self.catalog.discover_total_pages().await?;
        if total == 0 {
            return Ok(None);
        }
        let page = self.rng.gen_range(1..=total);
        let items = self.catalog.discover_page(page).await?;
        Ok(items.choose(&mut self.rng).cloned())
    }

    /// Attaches the trailer link and genre names; lookups that fail are left out.
    async fn enrich(&self, item: ResultItem) -> Post {
        let trailer_url = match self.catalog.trailer_url(item.id).await {
            Ok(url) => url,
            Err(e) => {
                warn!(id = item.id, error = %e, "trailer lookup failed");
                None
            }
        };
        let genres = match self.catalog.genre_names().await {
            Ok(map) => genre_names(&map, &item.genre_ids),
            Err(e) => {
                warn!(error = %e, "genre lookup failed");
                Vec::new()
            }
        };
        Post { item, trailer_url, genres }
    }

    /// Every sink gets the post regardless of how the others fared.
    async fn publish(&self, post: &Post) -> HashMap<&'static str, bool> {
        let mut outcome = HashMap::new();
        for sink in &self.sinks {
            let ok = match sink.publish(post).await {
                Ok(Delivery::Sent) => true,
                Ok(Delivery::Skipped(reason)) => {
                    info!(sink = sink.name(), reason, "post skipped");
                    false
                }
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "post failed");
                    false
                }
            };
            outcome.insert(sink.name(), ok);
        }
        outcome
    }
}

fn genre_names(map: &GenreMap, ids: &[u32]) -> Vec<String> {
    ids.iter().filter_map(|id| map.get(id).cloned()).collect()
}
