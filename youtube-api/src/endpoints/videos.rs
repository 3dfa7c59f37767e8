//! YouTube Videos API types and functionality.

use super::{API_BASE, Endpoint, Thumbnails};
use crate::error::Result;
use crate::executor::{ApiRequest, Canceller, RequestExecutor};
use crate::options::{ClientOptions, RequestOptions};
use crate::pagination::Page;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Response structure for the `videos.list` API call.
pub type VideoListResponse = Page<Video>;

/// A `video` resource represents a YouTube video.
///
/// Which fields are present depends on the requested `part`s.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<VideoSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<VideoContentDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<VideoStatistics>,
}

/// Basic details about the video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#snippet>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

/// See: <https://developers.google.com/youtube/v3/docs/videos#contentDetails>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContentDetails {
    /// ISO 8601 duration, e.g. `PT4M13S`.
    pub duration: String,
    #[serde(default)]
    pub definition: Option<String>,
    /// `"true"` if captions are available.
    #[serde(default)]
    pub caption: Option<String>,
}

/// Statistics about the video.
///
/// Counts are decimal strings, as returned by the API.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#statistics>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    /// Only visible to the video owner.
    #[serde(default)]
    pub dislike_count: Option<String>,
    /// Deprecated; always `0`.
    #[serde(default)]
    pub favorite_count: Option<String>,
    #[serde(default)]
    pub comment_count: Option<String>,
}

/// A `part` of the video resource that `videos.list` can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoPart {
    ContentDetails,
    FileDetails,
    Id,
    LiveStreamingDetails,
    Localizations,
    Player,
    ProcessingDetails,
    RecordingDetails,
    Snippet,
    Statistics,
    Status,
    Suggestions,
    TopicDetails,
}

impl VideoPart {
    pub const ALL: [VideoPart; 13] = [
        VideoPart::ContentDetails,
        VideoPart::FileDetails,
        VideoPart::Id,
        VideoPart::LiveStreamingDetails,
        VideoPart::Localizations,
        VideoPart::Player,
        VideoPart::ProcessingDetails,
        VideoPart::RecordingDetails,
        VideoPart::Snippet,
        VideoPart::Statistics,
        VideoPart::Status,
        VideoPart::Suggestions,
        VideoPart::TopicDetails,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VideoPart::ContentDetails => "contentDetails",
            VideoPart::FileDetails => "fileDetails",
            VideoPart::Id => "id",
            VideoPart::LiveStreamingDetails => "liveStreamingDetails",
            VideoPart::Localizations => "localizations",
            VideoPart::Player => "player",
            VideoPart::ProcessingDetails => "processingDetails",
            VideoPart::RecordingDetails => "recordingDetails",
            VideoPart::Snippet => "snippet",
            VideoPart::Statistics => "statistics",
            VideoPart::Status => "status",
            VideoPart::Suggestions => "suggestions",
            VideoPart::TopicDetails => "topicDetails",
        }
    }

    /// Quota units this part adds to a `videos.list` call.
    pub fn quota_cost(self) -> u32 {
        match self {
            VideoPart::Id | VideoPart::Player => 0,
            VideoPart::FileDetails | VideoPart::ProcessingDetails | VideoPart::Suggestions => 1,
            VideoPart::ContentDetails
            | VideoPart::LiveStreamingDetails
            | VideoPart::Localizations
            | VideoPart::RecordingDetails
            | VideoPart::Snippet
            | VideoPart::Statistics
            | VideoPart::Status
            | VideoPart::TopicDetails => 2,
        }
    }

    /// Combined cost of requesting `parts` together.
    pub fn total_cost(parts: &[VideoPart]) -> u32 {
        parts.iter().map(|p| p.quota_cost()).sum()
    }

    /// `parts` in the comma-separated form the `part` parameter expects.
    pub fn join(parts: &[VideoPart]) -> String {
        parts
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for VideoPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VideoPart {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        VideoPart::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown video part {s:?}"))
    }
}

/// One or more video ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIds(Vec<String>);

impl VideoIds {
    fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl From<&str> for VideoIds {
    fn from(id: &str) -> Self {
        Self(vec![id.to_string()])
    }
}

impl From<String> for VideoIds {
    fn from(id: String) -> Self {
        Self(vec![id])
    }
}

impl<S: AsRef<str>> From<&[S]> for VideoIds {
    fn from(ids: &[S]) -> Self {
        Self(ids.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

impl<S: AsRef<str>, const N: usize> From<[S; N]> for VideoIds {
    fn from(ids: [S; N]) -> Self {
        Self(ids.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

impl From<Vec<String>> for VideoIds {
    fn from(ids: Vec<String>) -> Self {
        Self(ids)
    }
}

/// Client for `videos.list`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/list>
#[derive(Debug)]
pub struct VideosClient {
    executor: RequestExecutor,
    endpoint_url: String,
}

impl VideosClient {
    /// Creates a client from caller options.
    ///
    /// If the options carry no `part`, only `snippet` is requested.
    pub fn new(options: RequestOptions) -> Result<Self> {
        Self::from_options(ClientOptions::try_from(options)?)
    }

    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            executor: RequestExecutor::new(&options)?,
            endpoint_url: format!("{API_BASE}/videos"),
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

    pub fn cancel(&self) -> bool {
        self.executor.cancel()
    }

    fn list_params(&self, ids: &VideoIds, parts: Option<&[VideoPart]>) -> RequestOptions {
        let mut params = RequestOptions::new().with("id", ids.joined());
        match parts {
            Some(parts) => params.set("part", VideoPart::join(parts)),
            None if !self.executor.defaults().contains_key("part") => {
                params.set("part", VideoPart::Snippet.as_str())
            }
            None => {}
        }
        params
    }

    /// Fetches the videos with the given ids.
    ///
    /// Unknown ids are silently left out of the response. Returns `None` if the
    /// request was cancelled.
    #[instrument(skip(self, ids))]
    pub async fn list(&self, ids: impl Into<VideoIds>) -> Result<Option<VideoListResponse>> {
        self.fetch(ids.into(), None).await
    }

    /// Like [`Self::list`], requesting exactly `parts`.
    #[instrument(skip(self, ids))]
    pub async fn list_parts(
        &self,
        ids: impl Into<VideoIds>,
        parts: &[VideoPart],
    ) -> Result<Option<VideoListResponse>> {
        tracing::trace!(quota = VideoPart::total_cost(parts), "listing videos");
        self.fetch(ids.into(), Some(parts)).await
    }

    async fn fetch(
        &self,
        ids: VideoIds,
        parts: Option<&[VideoPart]>,
    ) -> Result<Option<VideoListResponse>> {
        let params = self.list_params(&ids, parts);
        let request = ApiRequest::get(self.endpoint_url.as_str()).with_params(params);
        let Some(payload) = self.executor.execute(request).await? else {
            return Ok(None);
        };
        let videos: VideoListResponse = payload.into_json()?;

        tracing::debug!(
            requested = ids.0.len(),
            returned_items = videos.items.len(),
            "fetched videos"
        );
        Ok(Some(videos))
    }
}

impl Endpoint for VideosClient {
    fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}
