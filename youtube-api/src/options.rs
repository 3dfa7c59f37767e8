//! Request parameters and per-client configuration.
//!
//! A [`RequestOptions`] is an insertion-ordered mapping from parameter name to a scalar
//! value. Clients capture a copy of one at construction time as their defaults and merge
//! per-call parameters on top of it.
//!
//! Three keys are reserved and never forwarded to the API as ordinary query parameters:
//! [`TIMEOUT_KEY`], [`ACCESS_TOKEN_KEY`] and [`PAGE_TOKEN_KEY`]. [`ClientOptions`] pulls
//! them out of the mapping so they can drive the executor and the pagination cursor.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Request timeout used when the options do not carry a `timeout` key.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Request timeout in milliseconds.
pub const TIMEOUT_KEY: &str = "timeout";
/// Bearer token attached as an `Authorization` header.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Continuation token seeding the first page of a paginated query.
pub const PAGE_TOKEN_KEY: &str = "pageToken";

/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// The string value, if this is a string parameter.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        ParamValue::Str(s.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

/// Insertion-ordered mapping of parameter name to value.
///
/// A key may be present with no value (`None`, or `null` when deserialized). Such keys
/// are skipped when the mapping is encoded into a query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestOptions(IndexMap<String, Option<ParamValue>>);

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key`, overwriting any previous value but keeping its original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), Some(value.into()));
    }

    /// Marks `key` as present but absent-valued, so it is left out of the query string.
    pub fn unset(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), None);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Removes `key`, returning its value if it had one.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.shift_remove(key).flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over every key, including those without a value.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&ParamValue>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Iterates over keys that carry a value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    /// Returns a copy of `self` with every entry of `overrides` applied on top.
    pub fn merged(&self, overrides: &RequestOptions) -> RequestOptions {
        let mut merged = self.clone();
        for (k, v) in &overrides.0 {
            merged.0.insert(k.clone(), v.clone());
        }
        merged
    }
}

impl<K, V> FromIterator<(K, V)> for RequestOptions
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }
}

/// [`RequestOptions`] with the reserved keys pulled out.
///
/// Built once per client from the caller's options. The remaining parameters are sent
/// with every request the client makes.
#[derive(Clone)]
pub struct ClientOptions {
    params: RequestOptions,
    timeout: Duration,
    access_token: Option<String>,
    page_token: Option<String>,
}

impl ClientOptions {
    pub fn params(&self) -> &RequestOptions {
        &self.params
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn page_token(&self) -> Option<&str> {
        self.page_token.as_deref()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            params: RequestOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            access_token: None,
            page_token: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("page_token", &self.page_token)
            .finish()
    }
}

impl TryFrom<RequestOptions> for ClientOptions {
    type Error = Error;

    fn try_from(mut params: RequestOptions) -> Result<Self> {
        let timeout = match params.remove(TIMEOUT_KEY) {
            None => DEFAULT_TIMEOUT,
            Some(v) => parse_timeout(&v)?,
        };
        let access_token = params.remove(ACCESS_TOKEN_KEY).map(|v| v.to_string());
        let page_token = params.remove(PAGE_TOKEN_KEY).map(|v| v.to_string());
        Ok(Self {
            params,
            timeout,
            access_token,
            page_token,
        })
    }
}

fn parse_timeout(v: &ParamValue) -> Result<Duration> {
    let ms = match v {
        ParamValue::Int(ms) => u64::try_from(*ms).ok(),
        ParamValue::Float(ms) if ms.is_finite() && *ms >= 0.0 => Some(ms.round() as u64),
        ParamValue::Str(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    ms.map(Duration::from_millis).ok_or_else(|| {
        Error::precondition(format!(
            "`{TIMEOUT_KEY}` must be a non-negative number of milliseconds, got {v}"
        ))
    })
}
