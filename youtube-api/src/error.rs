//! Error taxonomy for every operation in this crate.
//!
//! All failures surface as a single [`Error`] value. Callers that need to branch on the
//! category without matching on fields can use [`Error::kind`].
//!
//! Cancellation is not an error. A cancelled request resolves to
//! `Ok(None)` (or [`crate::pagination::Advance::Cancelled`]) rather than an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shorthand for results produced by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Api,
    Timeout,
    Auth,
    Precondition,
}

/// One entry of the `errors` array in a structured YouTube API error body.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "locationType", default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// The `error` object of a structured YouTube API error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) code: u16,
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) errors: Vec<ApiErrorDetail>,
}

/// Wrapper for `{ "error": { ... } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub(crate) error: ApiErrorBody,
}

/// OAuth-specific failure reasons.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The authorization server (or token endpoint) reported an error.
    #[error("authorization server returned `{error}`{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Server {
        error: String,
        description: Option<String>,
    },

    #[error("state returned by the authorization server does not match the one sent")]
    StateMismatch,

    #[error("granted scope {returned:?} does not match requested scope {expected:?}")]
    ScopeMismatch {
        expected: String,
        returned: Option<String>,
    },

    #[error("token audience {returned:?} does not match client id")]
    AudienceMismatch { returned: Option<String> },

    #[error("malformed callback url: {0}")]
    MalformedCallback(String),

    #[error("authorization response lacks `{0}`")]
    MissingField(&'static str),
}

/// Every failure this crate can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, or an HTTP failure without a structured error body.
    #[error("transport error: {status_text}")]
    Transport {
        status: Option<http::StatusCode>,
        status_text: String,
    },

    /// The YouTube API answered with a structured `{ code, message, errors }` payload.
    #[error("YouTube API error {code}: {message}")]
    Api {
        code: u16,
        message: String,
        errors: Vec<ApiErrorDetail>,
    },

    /// No response arrived within the configured timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Caller-side misuse detected before any network call was made.
    #[error("{0}")]
    Precondition(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Api { .. } => ErrorKind::Api,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Precondition(_) => ErrorKind::Precondition,
        }
    }

    /// Whether issuing the same request again might succeed.
    ///
    /// Nothing in this crate retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Transport { .. })
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    pub(crate) fn transport(msg: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            status_text: msg.into(),
        }
    }
}

impl From<ApiErrorBody> for Error {
    fn from(body: ApiErrorBody) -> Self {
        Error::Api {
            code: body.code,
            message: body.message,
            errors: body.errors,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport {
            status: e.status(),
            status_text: e.to_string(),
        }
    }
}
