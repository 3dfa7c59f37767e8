//! Clients for individual YouTube Data API resources.
//!
//! Each client owns its own [`RequestExecutor`](crate::executor::RequestExecutor), so
//! options, timeout and cancellation never leak between clients.

pub mod captions;
pub mod search;
pub mod videos;

use crate::error::Result;
use crate::query::join_path;
use serde::{Deserialize, Serialize};

/// Base URL of the YouTube Data API v3.
pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Anything that talks to one fixed endpoint.
pub trait Endpoint {
    fn endpoint_url(&self) -> &str;

    /// The endpoint URL with percent-encoded path segments appended.
    fn at<S: AsRef<str>>(&self, segments: &[S]) -> Result<String> {
        join_path(self.endpoint_url(), segments)
    }
}

/// A single thumbnail image.
///
/// See: <https://developers.google.com/youtube/v3/docs/thumbnails>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Thumbnails keyed by size. Which ones are present depends on the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxres: Option<Thumbnail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Fixed(&'static str);

    impl Endpoint for Fixed {
        fn endpoint_url(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn at_appends_encoded_segments() {
        let e = Fixed("https://www.googleapis.com/youtube/v3/captions/");
        assert_eq!(
            e.at(&["caption id"]).unwrap(),
            "https://www.googleapis.com/youtube/v3/captions/caption%20id"
        );
    }
}
