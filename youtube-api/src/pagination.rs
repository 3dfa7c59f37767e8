//! Cursor-based pagination over YouTube list endpoints.
//!
//! A [`PaginationCursor`] is bound to one logical query. Each [`PaginationCursor::advance`]
//! issues exactly one request and returns exactly one page, threading the
//! `nextPageToken` of the previous page into the next request as `pageToken`:
//!
//! ```text
//! Fresh --advance--> InProgress --advance--> ... --advance--> Exhausted
//!   \___________________________________________________________^
//!          (first page already had no nextPageToken)
//! ```
//!
//! Once exhausted, further calls return [`Advance::Exhausted`] without touching the
//! network. Failed or cancelled calls leave the cursor where it was, so calling
//! `advance` again re-issues the same request.

use crate::error::Result;
use crate::options::{PAGE_TOKEN_KEY, RequestOptions};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_stream::Stream;

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}

/// One response from a paginated list endpoint.
///
/// A page without `next_page_token` is the last page for its query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
    #[serde(rename = "prevPageToken", default)]
    pub prev_page_token: Option<String>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: Option<PageInfo>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// Where a [`PaginationCursor`] is in its query's result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No page has been fetched yet.
    Fresh,
    /// At least one page was fetched and the last one had a continuation token.
    InProgress,
    /// The last fetched page had no continuation token.
    Exhausted,
}

/// Outcome of one [`PaginationCursor::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Advance<T> {
    Page(Page<T>),
    /// The result set has no more pages. No request was made.
    Exhausted,
    /// The request was cancelled before it completed. The cursor did not move.
    Cancelled,
}

/// Something that can fetch a single page given the full set of request parameters.
///
/// `Ok(None)` means the fetch was cancelled.
pub trait PageSource<T> {
    fn fetch_page(
        &self,
        params: RequestOptions,
    ) -> impl Future<Output = Result<Option<Page<T>>>> + Send;
}

impl<T, S> PageSource<T> for &S
where
    S: PageSource<T> + ?Sized,
{
    fn fetch_page(
        &self,
        params: RequestOptions,
    ) -> impl Future<Output = Result<Option<Page<T>>>> + Send {
        (**self).fetch_page(params)
    }
}

/// Pagination state for one logical query.
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    query: String,
    params: RequestOptions,
    next_page_token: Option<String>,
    etag: Option<String>,
    state: CursorState,
}

impl PaginationCursor {
    /// Creates a cursor for `query`, sending `params` with every request.
    ///
    /// `seed` is used as the `pageToken` of the very first request, if given.
    pub fn new(query: impl Into<String>, params: RequestOptions, seed: Option<String>) -> Self {
        Self {
            query: query.into(),
            params,
            next_page_token: seed,
            etag: None,
            state: CursorState::Fresh,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Whether this cursor was created for exactly `query`.
    pub fn matches(&self, query: &str) -> bool {
        self.query == query
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// The parameters the next [`Self::advance`] would send.
    pub fn next_params(&self) -> RequestOptions {
        let mut params = self.params.clone();
        if let Some(token) = &self.next_page_token {
            params.set(PAGE_TOKEN_KEY, token.as_str());
        }
        params
    }

    /// Fetches the next page from `source`.
    pub async fn advance<T, S>(&mut self, source: &S) -> Result<Advance<T>>
    where
        S: PageSource<T> + ?Sized,
    {
        if self.state == CursorState::Exhausted {
            tracing::trace!(query = %self.query, "cursor exhausted, not fetching");
            return Ok(Advance::Exhausted);
        }

        let Some(page) = source.fetch_page(self.next_params()).await? else {
            return Ok(Advance::Cancelled);
        };

        self.etag = page.etag.clone();
        self.next_page_token = page.next_page_token.clone();
        self.state = if page.is_last() {
            CursorState::Exhausted
        } else {
            CursorState::InProgress
        };

        tracing::debug!(
            query = %self.query,
            returned_items = page.items.len(),
            has_more = !page.is_last(),
            "fetched page"
        );

        Ok(Advance::Page(page))
    }

    /// Turns the cursor into a stream of individual items across all remaining pages.
    ///
    /// The stream ends when the result set is exhausted or a fetch is cancelled, and
    /// yields (then ends after) the first error.
    pub fn into_items<'a, T, S>(mut self, source: S) -> impl Stream<Item = Result<T>> + 'a
    where
        T: Send + 'a,
        S: PageSource<T> + Send + 'a,
    {
        async_stream::try_stream! {
            while let Advance::Page(page) = self.advance(&source).await? {
                for item in page.items {
                    yield item;
                }
            }
        }
    }
}
