//! Single-request execution with a timeout race and cooperative cancellation.
//!
//! Every call made by the endpoint clients goes through [`RequestExecutor::execute`]. It
//! performs exactly one HTTP request and races it against the client's timeout:
//!
//! - the response arrives first: it is classified into a [`Payload`] or an [`Error`];
//! - the timer fires first: the call fails with [`Error::Timeout`] and the in-flight
//!   request is dropped;
//! - the caller cancels first: the call resolves to `Ok(None)`.
//!
//! Each executor tracks at most one *current* [`PendingRequest`]. Starting a new call
//! supersedes the previous handle, so [`RequestExecutor::cancel`] (or a [`Canceller`]
//! obtained from the executor) only ever affects the most recently started call. The
//! superseded call keeps running and may still resolve.

use crate::error::{ApiErrorEnvelope, AuthError, Error, Result};
use crate::options::{ClientOptions, RequestOptions};
use crate::query::{append_query, encode_query};
use bytes::Bytes;
use http::Method;
use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Description of one HTTP call.
#[derive(Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    params: RequestOptions,
    form: Option<RequestOptions>,
    bearer_token: Option<String>,
}

impl ApiRequest {
    /// A `method` request to `url`, with no parameters of its own.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: RequestOptions::new(),
            form: None,
            bearer_token: None,
        }
    }

    /// Shorthand for [`Self::new`] with `GET`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Shorthand for [`Self::new`] with `POST`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Query parameters for this call. They override the client's defaults key by key.
    pub fn with_params(mut self, params: RequestOptions) -> Self {
        self.params = params;
        self
    }

    /// Sends `form` as an `application/x-www-form-urlencoded` body.
    pub fn with_form(mut self, form: RequestOptions) -> Self {
        self.form = Some(form);
        self
    }

    /// Bearer token for this call only, taking precedence over the client's token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL, without the query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &RequestOptions {
        &self.params
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("form", &self.form.as_ref().map(|_| "<form>"))
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// A successfully classified response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The response declared a JSON content type and was parsed.
    Json(serde_json::Value),
    /// Any other content type (e.g. subtitle text), passed through untouched.
    Raw {
        content_type: Option<String>,
        body: Bytes,
    },
}

impl Payload {
    /// Deserializes a JSON payload into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Payload::Json(value) => serde_json::from_value(value)
                .map_err(|e| Error::transport(format!("unexpected response shape: {e}"))),
            Payload::Raw { content_type, .. } => Err(Error::transport(format!(
                "expected a JSON response, got {}",
                content_type.as_deref().unwrap_or("no content type")
            ))),
        }
    }

    /// The body as UTF-8 text, for raw payloads.
    pub fn text(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Payload::Raw { body, .. } => Some(String::from_utf8_lossy(body)),
            Payload::Json(_) => None,
        }
    }
}

/// Handle to one in-flight call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    id: u64,
    token: CancellationToken,
}

impl PendingRequest {
    /// Resolves the associated call to "no result" if it has not finished yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Cancels whatever call is current on the executor it was obtained from.
///
/// Cheap to clone, and usable while the client itself is mutably borrowed by the call
/// being cancelled.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    current: Arc<Mutex<Option<PendingRequest>>>,
}

impl Canceller {
    /// Cancels the current call and releases its handle.
    ///
    /// Returns `false`, doing nothing, if no call is pending.
    pub fn cancel(&self) -> bool {
        match self.current.lock().take() {
            Some(pending) => {
                tracing::debug!(request = pending.id, "cancelling pending request");
                pending.cancel();
                true
            }
            None => false,
        }
    }

    /// The handle of the current call, if one is pending.
    pub fn pending(&self) -> Option<PendingRequest> {
        self.current.lock().clone()
    }

    fn supersede(&self, next: PendingRequest) {
        if let Some(prev) = self.current.lock().replace(next) {
            tracing::trace!(request = prev.id, "pending request superseded");
        }
    }

    fn release(&self, finished: &PendingRequest) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|p| p.id == finished.id) {
            *current = None;
        }
    }
}

/// Issues HTTP requests on behalf of one client.
///
/// Holds the client's default parameters, timeout, and bearer token, captured at
/// construction.
pub struct RequestExecutor {
    http: reqwest::Client,
    timeout: Duration,
    access_token: Option<String>,
    defaults: RequestOptions,
    current: Canceller,
    next_id: AtomicU64,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("timeout", &self.timeout)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("defaults", &self.defaults)
            .field("pending", &self.current.pending().map(|p| p.id))
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Creates an executor with its own HTTP connection pool.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::transport(format!("build HTTP client: {e}")))?;
        Ok(Self::with_http_client(options, http))
    }

    /// Creates an executor that shares an existing HTTP client.
    pub fn with_http_client(options: &ClientOptions, http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: options.timeout(),
            access_token: options.access_token().map(str::to_owned),
            defaults: options.params().clone(),
            current: Canceller::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    /// A handle that can cancel this executor's current call from elsewhere.
    pub fn canceller(&self) -> Canceller {
        self.current.clone()
    }

    /// Cancels the current call, if any. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        self.current.cancel()
    }

    /// The handle of the current call, if one is pending.
    pub fn pending(&self) -> Option<PendingRequest> {
        self.current.pending()
    }

    /// Performs `request` once.
    ///
    /// Returns `Ok(None)` if the call was cancelled before it completed.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: ApiRequest) -> Result<Option<Payload>> {
        let ApiRequest {
            method,
            url,
            params,
            form,
            bearer_token,
        } = request;

        let params = self.defaults.merged(&params);
        tracing::trace!(
            params = ?params.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            "issuing request"
        );
        let url = append_query(&url, &params);

        let mut builder = self.http.request(method, &url);
        if let Some(token) = bearer_token.as_deref().or(self.access_token.as_deref()) {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(form) = form {
            builder = builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_query(&form));
        }

        self.race(async move {
            let response = builder.send().await?;
            classify(response).await
        })
        .await
    }

    /// Races `call` against the timeout and against cancellation of a freshly started
    /// [`PendingRequest`].
    ///
    /// Whichever finishes first decides the outcome; the losers are dropped, which also
    /// clears the timer.
    /// The handle is released when the race ends or when the returned future is dropped
    /// unfinished.
    pub(crate) async fn race<T>(&self, call: impl Future<Output = Result<T>>) -> Result<Option<T>> {
        let current = self.begin();
        let pending = &current.pending;
        tokio::select! {
            biased;
            _ = pending.token.cancelled() => {
                tracing::debug!(request = pending.id, "request cancelled");
                Ok(None)
            }
            r = tokio::time::timeout(self.timeout, call) => match r {
                Ok(r) => r.map(Some),
                Err(_) => {
                    tracing::warn!(
                        request = pending.id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "request timed out"
                    );
                    Err(Error::Timeout(self.timeout))
                }
            },
        }
    }

    fn begin(&self) -> CurrentCall<'_> {
        let pending = PendingRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        self.current.supersede(pending.clone());
        CurrentCall {
            canceller: &self.current,
            pending,
        }
    }
}

/// Keeps a call registered as current until it is dropped.
struct CurrentCall<'a> {
    canceller: &'a Canceller,
    pending: PendingRequest,
}

impl Drop for CurrentCall<'_> {
    fn drop(&mut self) {
        self.canceller.release(&self.pending);
    }
}

/// OAuth-style error body, `{ "error": "invalid_token", "error_description": "..." }`.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Turns a response into a [`Payload`] or the matching [`Error`].
async fn classify(response: reqwest::Response) -> Result<Payload> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let is_json = content_type.as_deref().is_some_and(is_json_content_type);
    let body = response.bytes().await?;

    if status.is_success() {
        if !is_json {
            return Ok(Payload::Raw { content_type, body });
        }
        return serde_json::from_slice(&body)
            .map(Payload::Json)
            .map_err(|e| Error::Transport {
                status: Some(status),
                status_text: format!("invalid JSON in response body: {e}"),
            });
    }

    if is_json {
        if let Ok(envelope) = serde_json::from_slice::<ApiErrorEnvelope>(&body) {
            tracing::debug!(code = envelope.error.code, "API returned an error");
            return Err(envelope.error.into());
        }
        if let Ok(oauth) = serde_json::from_slice::<OAuthErrorBody>(&body) {
            tracing::debug!(error = %oauth.error, "authorization server returned an error");
            return Err(AuthError::Server {
                error: oauth.error,
                description: oauth.error_description,
            }
            .into());
        }
    }

    Err(Error::Transport {
        status: Some(status),
        status_text: status.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn executor(timeout_ms: u64) -> RequestExecutor {
        let options = ClientOptions::default().with_timeout(Duration::from_millis(timeout_ms));
        RequestExecutor::with_http_client(&options, reqwest::Client::new())
    }

    #[test]
    fn json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=UTF-8"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/vtt"));
        assert!(!is_json_content_type("application/octet-stream"));
    }

    #[test]
    fn cancel_without_pending_request_is_a_noop() {
        let exec = executor(1000);
        assert!(exec.pending().is_none());
        assert!(!exec.cancel());
        assert!(!exec.canceller().cancel());
    }

    #[tokio::test]
    async fn never_resolving_call_times_out() {
        let exec = executor(50);
        let start = Instant::now();
        let err = exec
            .race(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(
            elapsed < Duration::from_millis(150),
            "timeout took {elapsed:?}"
        );
        assert!(exec.pending().is_none(), "handle must be released");
    }

    #[tokio::test]
    async fn cancel_resolves_to_none() {
        let exec = executor(5000);
        let canceller = exec.canceller();
        let (outcome, cancelled) = tokio::join!(
            exec.race(std::future::pending::<Result<u32>>()),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                canceller.cancel()
            }
        );
        assert!(cancelled);
        assert_eq!(outcome.unwrap(), None);
        assert!(exec.pending().is_none());
    }

    #[tokio::test]
    async fn completed_call_releases_its_handle() {
        let exec = executor(1000);
        let out = exec.race(async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(out, Some(7));
        assert!(exec.pending().is_none());
        assert!(!exec.cancel());
    }

    #[tokio::test]
    async fn abandoned_call_releases_its_handle() {
        let exec = executor(5000);
        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            exec.race(std::future::pending::<Result<()>>()),
        )
        .await;
        assert!(outer.is_err());
        assert!(exec.pending().is_none());
        assert!(!exec.cancel());
    }

    #[tokio::test]
    async fn new_call_supersedes_the_previous_handle() {
        let exec = executor(5000);
        let canceller = exec.canceller();
        let (first, second, _) = tokio::join!(
            exec.race(async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok::<_, Error>("first")
            }),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                exec.race(std::future::pending::<Result<&str>>()).await
            },
            async {
                tokio::time::sleep(Duration::from_millis(15)).await;
                // only the second call is current by now
                assert!(canceller.cancel());
            }
        );
        assert_eq!(first.unwrap(), Some("first"));
        assert_eq!(second.unwrap(), None);
    }

    #[test]
    fn payload_into_json_rejects_raw() {
        let raw = Payload::Raw {
            content_type: Some("text/vtt".into()),
            body: Bytes::from_static(b"WEBVTT\n"),
        };
        assert_eq!(raw.text().as_deref(), Some("WEBVTT\n"));
        let err = raw.into_json::<serde_json::Value>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn request_debug_redacts_token() {
        let req = ApiRequest::get("https://example.com").with_bearer_token("ya29.secret");
        assert!(!format!("{req:?}").contains("ya29.secret"));
    }
}
