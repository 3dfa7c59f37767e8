//! YouTube Search API types and functionality.

use super::{API_BASE, Endpoint, Thumbnails};
use crate::error::Result;
use crate::executor::{ApiRequest, Canceller, RequestExecutor};
use crate::options::{ClientOptions, RequestOptions};
use crate::pagination::{Advance, Page, PageSource, PaginationCursor};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tracing::instrument;

/// Identifies the resource a [`SearchResult`] points at.
///
/// Exactly one of the id fields is set, matching `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    /// `youtube#video`, `youtube#channel` or `youtube#playlist`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
}

/// Basic details about a search result.
///
/// See: <https://developers.google.com/youtube/v3/docs/search#snippet>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultSnippet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
    #[serde(default)]
    pub channel_title: String,
    /// `live`, `upcoming` or `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_broadcast_content: Option<String>,
}

/// One item of a `search.list` response.
///
/// See: <https://developers.google.com/youtube/v3/docs/search#resource>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Always `youtube#searchResult`.
    pub kind: String,
    pub etag: String,
    pub id: ResourceId,
    /// Present when `part` includes `snippet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<SearchResultSnippet>,
}

/// Fetches search pages through a borrowed executor.
#[derive(Clone, Copy)]
struct SearchPages<'a> {
    executor: &'a RequestExecutor,
    url: &'a str,
}

impl PageSource<SearchResult> for SearchPages<'_> {
    async fn fetch_page(&self, params: RequestOptions) -> Result<Option<Page<SearchResult>>> {
        let request = ApiRequest::get(self.url).with_params(params);
        match self.executor.execute(request).await? {
            Some(payload) => payload.into_json().map(Some),
            None => Ok(None),
        }
    }
}

fn cursor_for(executor: &RequestExecutor, seed: Option<&str>, query: &str) -> PaginationCursor {
    let mut params = RequestOptions::new().with("q", query);
    if !executor.defaults().contains_key("part") {
        params.set("part", "snippet");
    }
    PaginationCursor::new(query, params, seed.map(str::to_owned))
}

/// Client for `search.list`.
///
/// Repeated [`Self::search`] calls with the same query walk through the result set one
/// page at a time. A different query starts over from the first page.
///
/// See: <https://developers.google.com/youtube/v3/docs/search/list>
#[derive(Debug)]
pub struct SearchClient {
    executor: RequestExecutor,
    endpoint_url: String,
    seed: Option<String>,
    cursor: Option<PaginationCursor>,
}

impl SearchClient {
    /// Creates a client from caller options.
    ///
    /// Besides the reserved `timeout`, `access_token` and `pageToken` keys, every option
    /// (`part`, `maxResults`, `type`, `key`, ...) is sent with each request. `pageToken`
    /// seeds the first page of every new query.
    pub fn new(options: RequestOptions) -> Result<Self> {
        Self::from_options(ClientOptions::try_from(options)?)
    }

    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            executor: RequestExecutor::new(&options)?,
            endpoint_url: format!("{API_BASE}/search"),
            seed: options.page_token().map(str::to_owned),
            cursor: None,
        })
    }

    /// Points the client at another endpoint, e.g. a local mock.
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    pub fn canceller(&self) -> Canceller {
        self.executor.canceller()
    }

    /// Cancels the current request, if any.
    pub fn cancel(&self) -> bool {
        self.executor.cancel()
    }

    /// The cursor of the query searched last, if any.
    pub fn cursor(&self) -> Option<&PaginationCursor> {
        self.cursor.as_ref()
    }

    fn new_cursor(&self, query: &str) -> PaginationCursor {
        cursor_for(&self.executor, self.seed.as_deref(), query)
    }

    /// Returns the next page of results for `query`.
    ///
    /// Once the result set is exhausted this returns `Some` of an empty list without
    /// making a request. Returns `None` if the request was cancelled.
    #[instrument(skip(self))]
    pub async fn search(&mut self, query: &str) -> Result<Option<Vec<SearchResult>>> {
        if !self.cursor.as_ref().is_some_and(|c| c.matches(query)) {
            tracing::debug!("starting a new search");
            self.cursor = None;
        }
        let cursor = self
            .cursor
            .get_or_insert_with(|| cursor_for(&self.executor, self.seed.as_deref(), query));
        let source = SearchPages {
            executor: &self.executor,
            url: &self.endpoint_url,
        };

        Ok(match cursor.advance(&source).await? {
            Advance::Page(page) => Some(page.items),
            Advance::Exhausted => Some(Vec::new()),
            Advance::Cancelled => None,
        })
    }

    /// Streams every result for `query`, from the first page to the last.
    ///
    /// Independent of the page-by-page state kept for [`Self::search`].
    pub fn search_all(&self, query: &str) -> impl Stream<Item = Result<SearchResult>> + '_ {
        let source = SearchPages {
            executor: &self.executor,
            url: &self.endpoint_url,
        };
        self.new_cursor(query).into_items(source)
    }
}

impl Endpoint for SearchClient {
    fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}
