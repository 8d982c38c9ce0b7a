use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::TmdbAuth;

/// The provider refuses `page` values above this.
pub const MAX_DISCOVER_PAGE: u32 = 500;

pub type GenreMap = HashMap<u32, String>;

/// Errors are rendered verbatim to users, so they never carry request URLs
/// (the v3 key travels in the query string).
#[derive(Debug, Error)]
pub enum TmdbError {
    #[error("An error occurred: {0}")]
    Transport(reqwest::Error),
    #[error("HTTP error occurred: {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("Failed to decode JSON response.")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TmdbError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
}

impl MediaKind {
    fn search_path(self) -> &'static str {
        match self {
            Self::Movie => "search/movie",
            Self::Tv => "search/tv",
        }
    }
}

/// One search/trending/discover hit; movies and shows share the shape,
/// shows use `name`/`first_air_date` on the wire.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ResultItem {
    pub id: u64,
    #[serde(alias = "name", default, deserialize_with = "null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub overview: String,
    #[serde(alias = "first_air_date", default, deserialize_with = "null_default")]
    pub release_date: String,
    #[serde(default, deserialize_with = "null_default")]
    pub vote_average: f64,
    #[serde(default, deserialize_with = "null_default")]
    pub vote_count: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub original_language: String,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub genre_ids: Vec<u32>,
    #[serde(skip)]
    pub kind: MediaKind,
}

impl ResultItem {
    pub fn year(&self) -> Option<&str> {
        self.release_date.get(..4)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TvDetails {
    pub id: u64,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub seasons: Vec<Season>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Season {
    pub season_number: u32,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub episode_count: u32,
}

impl TvDetails {
    pub fn season(&self, number: u32) -> Option<&Season> {
        self.seasons.iter().find(|s| s.season_number == number)
    }
}

#[derive(Clone)]
pub struct TmdbClient {
    http: Client,
    base_url: String,
    auth: TmdbAuth,
    genres: Arc<OnceCell<Arc<GenreMap>>>,
}

impl TmdbClient {
    /// `base_url` must end with `/`; paths are appended to it.
    pub fn new(base_url: impl Into<String>, auth: TmdbAuth, timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            auth,
            genres: Arc::new(OnceCell::new()),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, TmdbError> {
        let req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json")
            .query(query);
        let req = match &self.auth {
            TmdbAuth::Bearer(token) => req.bearer_auth(token),
            TmdbAuth::ApiKey(key) => req.query(&[("api_key", key)]),
        };
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TmdbError::Status { status, path: path.to_string() });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Search movies or shows by title; first provider page only.
    pub async fn search(&self, kind: MediaKind, query: &str) -> Result<Vec<ResultItem>, TmdbError> {
        let page: ResultsPage = self
            .get_json(
                kind.search_path(),
                &[
                    ("query", query.to_string()),
                    ("include_adult", "false".into()),
                    ("language", "en-US".into()),
                    ("page", "1".into()),
                ],
            )
            .await?;
        debug!(?kind, query, hits = page.results.len(), "search finished");
        Ok(with_kind(page.results, kind))
    }

    pub async fn search_movies(&self, query: &str) -> Result<Vec<ResultItem>, TmdbError> {
        self.search(MediaKind::Movie, query).await
    }

    pub async fn search_tv(&self, query: &str) -> Result<Vec<ResultItem>, TmdbError> {
        self.search(MediaKind::Tv, query).await
    }

    /// `Ok(None)` when the provider does not know the show.
    pub async fn tv_details(&self, id: u64) -> Result<Option<TvDetails>, TmdbError> {
        match self.get_json(&format!("tv/{id}"), &[("language", "en-US".into())]).await {
            Ok(details) => Ok(Some(details)),
            Err(TmdbError::Status { status: StatusCode::NOT_FOUND, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Best YouTube trailer: official before unofficial, trailers before teasers.
    pub async fn trailer_url(&self, movie_id: u64) -> Result<Option<String>, TmdbError> {
        let videos: VideosResp = self
            .get_json(&format!("movie/{movie_id}/videos"), &[("language", "en-US".into())])
            .await?;
        let mut candidates: Vec<&Video> = videos
            .results
            .iter()
            .filter(|v| v.site.eq_ignore_ascii_case("YouTube"))
            .filter(|v| matches!(v.r#type.as_str(), "Trailer" | "Teaser"))
            .collect();
        candidates.sort_by_key(|v| {
            let official = if v.official.unwrap_or(false) { 0 } else { 1 };
            let typ = if v.r#type == "Trailer" { 0 } else { 1 };
            (official, typ)
        });
        Ok(candidates.first().map(|v| format!("https://www.youtube.com/watch?v={}", v.key)))
    }

    /// Movie genre names by id. Loaded on the first successful call and kept
    /// for the life of the client; failures are not cached.
    pub async fn genre_names(&self) -> Result<Arc<GenreMap>, TmdbError> {
        let map = self
            .genres
            .get_or_try_init(|| async {
                let resp: GenresResp = self.get_json("genre/movie/list", &[("language", "en-US".into())]).await?;
                let map: GenreMap = resp.genres.into_iter().map(|g| (g.id, g.name)).collect();
                info!(count = map.len(), "loaded genres");
                Ok::<_, TmdbError>(Arc::new(map))
            })
            .await?;
        Ok(map.clone())
    }

    pub async fn trending_movies(&self) -> Result<Vec<ResultItem>, TmdbError> {
        let page: ResultsPage = self
            .get_json("trending/movie/day", &[("language", "en-US".into())])
            .await?;
        info!(count = page.results.len(), "got trending movies");
        Ok(with_kind(page.results, MediaKind::Movie))
    }

    /// Number of popularity-sorted discover pages, capped at [`MAX_DISCOVER_PAGE`].
    pub async fn discover_total_pages(&self) -> Result<u32, TmdbError> {
        let page = self.discover(1).await?;
        if page.total_pages == 0 {
            warn!("discover reported no pages");
        }
        Ok(page.total_pages.min(MAX_DISCOVER_PAGE))
    }

    pub async fn discover_page(&self, page: u32) -> Result<Vec<ResultItem>, TmdbError> {
        Ok(with_kind(self.discover(page).await?.results, MediaKind::Movie))
    }

    async fn discover(&self, page: u32) -> Result<ResultsPage, TmdbError> {
        self.get_json(
            "discover/movie",
            &[
                ("language", "en-US".into()),
                ("sort_by", "popularity.desc".into()),
                ("include_adult", "false".into()),
                ("page", page.to_string()),
            ],
        )
        .await
    }
}

fn with_kind(mut items: Vec<ResultItem>, kind: MediaKind) -> Vec<ResultItem> {
    for item in &mut items {
        item.kind = kind;
    }
    items
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/* ======= DTOs ======= */

#[derive(Deserialize, Debug)]
struct ResultsPage {
    #[serde(default)]
    results: Vec<ResultItem>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Deserialize, Debug)]
struct VideosResp {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Deserialize, Debug)]
struct Video {
    key: String,
    site: String,
    r#type: String,
    official: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct GenresResp {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Deserialize, Debug)]
struct Genre {
    id: u32,
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer, auth: TmdbAuth) -> TmdbClient {
        TmdbClient::new(format!("{}/", server.uri()), auth, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn search_movies_sends_bearer_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "inception"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "total_pages": 1,
                "results": [
                    {"id": 27205, "title": "Inception", "overview": "Dreams.", "release_date": "2010-07-15",
                     "vote_average": 8.4, "vote_count": 35000, "original_language": "en",
                     "backdrop_path": "/b.jpg", "genre_ids": [28, 878]},
                    {"id": 1, "title": "Untitled", "overview": null, "release_date": null,
                     "vote_average": 0, "vote_count": 0, "original_language": "en"}
                ]
            })))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("tok".into())).await;
        let items = tmdb.search_movies("inception").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Inception");
        assert_eq!(items[0].year(), Some("2010"));
        assert_eq!(items[0].genre_ids, vec![28, 878]);
        assert_eq!(items[0].kind, MediaKind::Movie);
        assert_eq!(items[1].overview, "");
        assert_eq!(items[1].year(), None);
    }

    #[tokio::test]
    async fn search_tv_maps_name_and_air_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("api_key", "v3key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1399, "name": "Game of Thrones", "first_air_date": "2011-04-17",
                             "overview": "Seven kingdoms.", "vote_average": 8.5, "vote_count": 20000,
                             "original_language": "en"}]
            })))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::ApiKey("v3key".into())).await;
        let items = tmdb.search_tv("thrones").await.unwrap();
        assert_eq!(items[0].title, "Game of Thrones");
        assert_eq!(items[0].release_date, "2011-04-17");
        assert_eq!(items[0].kind, MediaKind::Tv);
    }

    #[tokio::test]
    async fn http_failure_becomes_readable_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::ApiKey("secret".into())).await;
        let err = tmdb.search_movies("x").await.unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("HTTP error occurred: 401"), "{text}");
        assert!(!text.contains("secret"));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending/movie/day"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("t".into())).await;
        assert!(matches!(tmdb.trending_movies().await, Err(TmdbError::Decode(_))));
    }

    #[tokio::test]
    async fn tv_details_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tv/1399"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1399, "name": "Game of Thrones",
                "seasons": [
                    {"season_number": 0, "name": "Specials", "episode_count": 14},
                    {"season_number": 1, "name": "Season 1", "episode_count": 10}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tv/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("t".into())).await;
        let details = tmdb.tv_details(1399).await.unwrap().unwrap();
        assert_eq!(details.seasons.len(), 2);
        assert_eq!(details.season(1).map(|s| s.episode_count), Some(10));
        assert!(tmdb.tv_details(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trailer_prefers_official_youtube_trailer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/27205/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"key": "vimeo1", "site": "Vimeo", "type": "Trailer", "official": true},
                    {"key": "teaser", "site": "YouTube", "type": "Teaser", "official": true},
                    {"key": "fan", "site": "YouTube", "type": "Trailer", "official": false},
                    {"key": "real", "site": "YouTube", "type": "Trailer", "official": true},
                    {"key": "bts", "site": "YouTube", "type": "Featurette", "official": true}
                ]
            })))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("t".into())).await;
        assert_eq!(
            tmdb.trailer_url(27205).await.unwrap().as_deref(),
            Some("https://www.youtube.com/watch?v=real")
        );
    }

    #[tokio::test]
    async fn genres_are_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genre/movie/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("t".into())).await;
        let first = tmdb.genre_names().await.unwrap();
        let second = tmdb.clone().genre_names().await.unwrap();
        assert_eq!(first.get(&878).map(String::as_str), Some("Science Fiction"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn discover_pages_are_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .and(query_param("page", "1"))
            .and(query_param("sort_by", "popularity.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "total_pages": 48000})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .and(query_param("page", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 5, "title": "Five"}], "total_pages": 48000
            })))
            .mount(&server)
            .await;

        let tmdb = client(&server, TmdbAuth::Bearer("t".into())).await;
        assert_eq!(tmdb.discover_total_pages().await.unwrap(), MAX_DISCOVER_PAGE);
        let page = tmdb.discover_page(42).await.unwrap();
        assert_eq!(page[0].id, 5);
    }
}
