//! OAuth2 token material handed back to callers.

use crate::error::{Error, Result};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How long before the reported expiry a token is already treated as expired.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// An access token, optionally paired with a refresh token.
///
/// `expires_in` is the lifetime in seconds reported by the server and `created` is when
/// this library received the token. The two are set together or not at all. Expiry is
/// always computed from them, never stored.
///
/// The library does not keep tokens around; persisting them (and stripping
/// `refresh_token` before handing a token to less trusted code, see
/// [`Token::without_refresh_token`]) is up to the caller. Serializes as a flat object
/// with `created` in milliseconds since the Unix epoch; deserializing rejects objects
/// that carry only one of `expires_in` and `created`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredToken")]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "jiff::fmt::serde::timestamp::millisecond::optional"
    )]
    pub created: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space-separated scopes granted to this token, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Wire shape of [`Token`], checked before it becomes one.
#[derive(Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default, with = "jiff::fmt::serde::timestamp::millisecond::optional")]
    created: Option<Timestamp>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TryFrom<StoredToken> for Token {
    type Error = String;

    fn try_from(stored: StoredToken) -> std::result::Result<Self, Self::Error> {
        match (stored.expires_in, stored.created) {
            (Some(_), None) => return Err("token has `expires_in` but no `created`".into()),
            (None, Some(_)) => return Err("token has `created` but no `expires_in`".into()),
            _ => {}
        }
        Ok(Self {
            access_token: stored.access_token,
            token_type: stored.token_type,
            expires_in: stored.expires_in,
            created: stored.created,
            refresh_token: stored.refresh_token,
            scope: stored.scope,
        })
    }
}

impl Token {
    /// A token received at `created`, valid for `expires_in` from then.
    pub fn issued(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: Option<Duration>,
        created: Timestamp,
    ) -> Self {
        let expires_in = expires_in.map(|d| d.as_secs());
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            created: expires_in.map(|_| created),
            expires_in,
            refresh_token: None,
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// A copy of this token without the refresh token.
    pub fn without_refresh_token(&self) -> Self {
        Self {
            refresh_token: None,
            ..self.clone()
        }
    }

    /// The instant after which [`Self::is_expired`] reports `true`.
    pub fn expires_at(&self) -> Result<Timestamp> {
        Timestamp::from_millisecond(self.deadline_ms()?)
            .map_err(|e| Error::precondition(format!("token expiry out of range: {e}")))
    }

    /// Whether the token has expired, or will within [`EXPIRY_MARGIN`].
    ///
    /// Fails with [`Error::Precondition`] if `expires_in` or `created` is missing.
    pub fn is_expired(&self) -> Result<bool> {
        self.is_expired_at(Timestamp::now())
    }

    /// [`Self::is_expired`] against an explicit clock reading.
    pub fn is_expired_at(&self, now: Timestamp) -> Result<bool> {
        Ok(self.deadline_ms()? < now.as_millisecond())
    }

    /// `created + (expires_in - margin) * 1000`, in milliseconds.
    fn deadline_ms(&self) -> Result<i64> {
        match (self.created, self.expires_in) {
            (Some(created), Some(expires_in)) => {
                let deadline = i64::try_from(expires_in)
                    .ok()
                    .and_then(|s| s.checked_sub(EXPIRY_MARGIN.as_secs() as i64))
                    .and_then(|s| s.checked_mul(1000))
                    .and_then(|ms| created.as_millisecond().checked_add(ms))
                    .ok_or_else(|| Error::precondition("token `expires_in` is out of range"))?;
                Ok(deadline)
            }
            (_, None) => Err(Error::precondition("token lacks `expires_in`")),
            (None, _) => Err(Error::precondition("token lacks `created`")),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("created", &self.created)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}
