//! YouTube Captions API types and functionality.

use super::{API_BASE, Endpoint};
use crate::error::{Error, Result};
use crate::executor::{ApiRequest, Canceller, Payload, RequestExecutor};
use crate::options::{ClientOptions, RequestOptions};
use crate::pagination::Page;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Response structure for the `captions.list` API call.
pub type CaptionListResponse = Page<Caption>;

/// A `caption` resource represents one caption track of a video.
///
/// See: <https://developers.google.com/youtube/v3/docs/captions#resource>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    /// Caption track id, as accepted by [`CaptionsClient::download`].
    pub id: String,
    #[serde(default)]
    pub etag: Option<String>,
    /// Present when `part` includes `snippet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<CaptionSnippet>,
}

/// See: <https://developers.google.com/youtube/v3/docs/captions#snippet>
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionSnippet {
    /// The video this track belongs to.
    pub video_id: String,
    /// When the track was last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
    /// `standard`, `ASR` or `forced`.
    #[serde(default)]
    pub track_kind: Option<String>,
    /// BCP-47 language tag.
    pub language: String,
    /// Track name shown to viewers; often empty.
    #[serde(default)]
    pub name: String,
    /// Drafts are not publicly visible.
    #[serde(default)]
    pub is_draft: bool,
    /// `serving`, `syncing` or `failed`.
    #[serde(default)]
    pub status: Option<String>,
}

/// A `part` of the caption resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptionPart {
    #[default]
    Id,
    Snippet,
}

impl CaptionPart {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptionPart::Id => "id",
            CaptionPart::Snippet => "snippet",
        }
    }
}

/// Subtitle formats a caption track can be converted to on download.
///
/// Whether a given track is available in a format is decided by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    /// SubViewer.
    Sbv,
    /// Scenarist Closed Caption.
    Scc,
    /// SubRip.
    Srt,
    /// Timed Text Markup Language.
    Ttml,
    /// Web Video Text Tracks.
    Vtt,
}

impl CaptionFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptionFormat::Sbv => "sbv",
            CaptionFormat::Scc => "scc",
            CaptionFormat::Srt => "srt",
            CaptionFormat::Ttml => "ttml",
            CaptionFormat::Vtt => "vtt",
        }
    }
}

impl fmt::Display for CaptionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptionFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sbv" => Ok(CaptionFormat::Sbv),
            "scc" => Ok(CaptionFormat::Scc),
            "srt" => Ok(CaptionFormat::Srt),
            "ttml" => Ok(CaptionFormat::Ttml),
            "vtt" => Ok(CaptionFormat::Vtt),
            _ => Err(format!("unknown caption format {s:?}")),
        }
    }
}

/// Client for the `captions` resource.
///
/// See: <https://developers.google.com/youtube/v3/docs/captions>
#[derive(Debug)]
pub struct CaptionsClient {
    executor: RequestExecutor,
    endpoint_url: String,
}

impl CaptionsClient {
    pub fn new(options: RequestOptions) -> Result<Self> {
        Self::from_options(ClientOptions::try_from(options)?)
    }

    pub fn from_options(options: ClientOptions) -> Result<Self> {
        Ok(Self {
            executor: RequestExecutor::new(&options)?,
            endpoint_url: format!("{API_BASE}/captions"),
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

    /// Lists the caption tracks of `video_id`.
    ///
    /// See: <https://developers.google.com/youtube/v3/docs/captions/list>
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        video_id: &str,
        part: CaptionPart,
    ) -> Result<Option<CaptionListResponse>> {
        let params = RequestOptions::new()
            .with("part", part.as_str())
            .with("videoId", video_id);
        let request = ApiRequest::get(self.endpoint_url.as_str()).with_params(params);
        let Some(payload) = self.executor.execute(request).await? else {
            return Ok(None);
        };
        let captions: CaptionListResponse = payload.into_json()?;
        tracing::debug!(
            returned_items = captions.items.len(),
            "fetched caption tracks"
        );
        Ok(Some(captions))
    }

    /// Downloads caption track `id`, converted to `format` if given.
    ///
    /// Caption content always requires authorization: without a configured access token
    /// this fails with [`Error::Precondition`] before any request is made. The track is
    /// usually returned as [`Payload::Raw`] subtitle text.
    ///
    /// See: <https://developers.google.com/youtube/v3/docs/captions/download>
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        id: &str,
        format: Option<CaptionFormat>,
    ) -> Result<Option<Payload>> {
        if !self.executor.has_access_token() {
            return Err(Error::precondition("downloading captions requires an access token"));
        }
        let mut params = RequestOptions::new();
        if let Some(format) = format {
            params.set("tfmt", format.as_str());
        }
        let request = ApiRequest::get(self.at(&[id])?).with_params(params);
        self.executor.execute(request).await
    }
}

impl Endpoint for CaptionsClient {
    fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}
