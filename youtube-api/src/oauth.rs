//! OAuth 2.0 token lifecycle for YouTube API access.
//!
//! Covers both grants Google offers to YouTube clients:
//!
//! - **authorization code** (`access_type=offline`): the user is redirected back with a
//!   short-lived `code`, which the server exchanges for an access/refresh token pair with
//!   [`OAuthManager::exchange_code_for_token`];
//! - **implicit** (`access_type=online`): the access token arrives directly in the
//!   redirect fragment. Since nothing proves the token was issued to us, it must be
//!   checked against the introspection endpoint with
//!   [`OAuthManager::validate_access_token`] before use.
//!
//! In both cases the redirect must pass [`validate_callback`] first, which rejects
//! server-reported errors and any `state` or `scope` that differs from what was sent.
//!
//! Tokens are returned to the caller and never cached here.

use crate::endpoints::Endpoint;
use crate::error::{AuthError, Error, Result};
use crate::executor::{ApiRequest, Canceller, RequestExecutor};
use crate::options::{ClientOptions, RequestOptions};
use crate::token::Token;
use indexmap::IndexMap;
use jiff::Timestamp;
use oauth2::basic::{
    BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicTokenResponse, BasicTokenType,
};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Google OAuth2 authorization endpoint the user is sent to.
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth2 token endpoint used for both code exchange and token refresh.
pub const TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v3/token";
/// Google token introspection endpoint.
pub const TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";

/// YouTube OAuth scopes.
///
/// See: <https://developers.google.com/youtube/v3/guides/auth/installed-apps#identify-access-scopes>
pub mod scope {
    /// Manage your YouTube account.
    pub const YOUTUBE: &str = "https://www.googleapis.com/auth/youtube";
    /// Manage your YouTube account, over TLS only. The default scope.
    pub const YOUTUBE_FORCE_SSL: &str = "https://www.googleapis.com/auth/youtube.force-ssl";
    /// View your YouTube account.
    pub const YOUTUBE_READONLY: &str = "https://www.googleapis.com/auth/youtube.readonly";
    /// Manage your YouTube videos.
    pub const YOUTUBE_UPLOAD: &str = "https://www.googleapis.com/auth/youtube.upload";
    /// View and manage your assets and associated content on YouTube.
    pub const YOUTUBEPARTNER: &str = "https://www.googleapis.com/auth/youtubepartner";
    /// View private information of your YouTube channel relevant during the audit process
    /// with a YouTube partner.
    pub const YOUTUBEPARTNER_CHANNEL_AUDIT: &str =
        "https://www.googleapis.com/auth/youtubepartner-channel-audit";
}

fn default_auth_url() -> String {
    AUTH_URL.to_string()
}

fn default_token_url() -> String {
    TOKEN_URL.to_string()
}

fn default_tokeninfo_url() -> String {
    TOKENINFO_URL.to_string()
}

/// Client registration and endpoint configuration.
///
/// `client_secret` is only ever sent to the token endpoint; it never appears in URLs
/// meant for the user's browser.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: String,
}

impl OAuthConfig {
    /// Configuration against Google's public endpoints.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            tokeninfo_url: default_tokeninfo_url(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("tokeninfo_url", &self.tokeninfo_url)
            .finish()
    }
}

/// Whether the application needs to act while the user is away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Implicit grant: `response_type=token`, no refresh token.
    #[default]
    Online,
    /// Authorization-code grant: `response_type=code`, `access_type=offline`.
    Offline,
}

impl AccessType {
    pub fn response_type(self) -> &'static str {
        match self {
            AccessType::Online => "token",
            AccessType::Offline => "code",
        }
    }
}

/// Per-authorization parameters for [`OAuthManager::build_authorization_url`].
#[derive(Debug, Clone)]
pub struct AuthRequestParams {
    /// Space-separated scopes. Defaults to [`scope::YOUTUBE_FORCE_SSL`].
    pub scope: Option<String>,
    /// Anti-forgery token echoed back by the authorization server.
    pub state: String,
    pub access_type: AccessType,
    /// e.g. `consent` to force a refresh token to be issued again.
    pub prompt: Option<String>,
    /// Any other parameter the authorization server understands (`login_hint`, ...).
    pub extra: RequestOptions,
}

impl AuthRequestParams {
    pub fn new(state: impl Into<String>, access_type: AccessType) -> Self {
        Self {
            scope: None,
            state: state.into(),
            access_type,
            prompt: None,
            extra: RequestOptions::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// The scope that will be requested.
    pub fn requested_scope(&self) -> &str {
        self.scope.as_deref().unwrap_or(scope::YOUTUBE_FORCE_SSL)
    }
}

/// Flat key/value view of an authorization redirect.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackResponse(IndexMap<String, String>);

impl CallbackResponse {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for CallbackResponse
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let pairs = iter.into_iter().map(|(k, v)| (k.into(), v.into()));
        Self(pairs.collect())
    }
}

impl fmt::Debug for CallbackResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // codes and tokens are credentials
        f.debug_map()
            .entries(self.0.iter().map(|(k, v)| {
                let v = match k.as_str() {
                    "code" | "access_token" | "id_token" => "<redacted>",
                    _ => v.as_str(),
                };
                (k, v)
            }))
            .finish()
    }
}

/// What a validated redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    /// Authorization-code grant: exchange with [`OAuthManager::exchange_code_for_token`].
    Code(String),
    /// Implicit grant: still needs [`OAuthManager::validate_access_token`].
    Token(Token),
}

/// Parses the fragment (preferred) or the query string of a redirect URL.
///
/// Fails with [`AuthError::MalformedCallback`] if the URL does not parse or carries
/// neither.
pub fn extract_callback_response(callback_url: &str) -> Result<CallbackResponse> {
    let url = Url::parse(callback_url)
        .map_err(|e| AuthError::MalformedCallback(format!("{callback_url:?}: {e}")))?;
    let raw = url
        .fragment()
        .filter(|f| !f.is_empty())
        .or_else(|| url.query().filter(|q| !q.is_empty()))
        .ok_or_else(|| {
            AuthError::MalformedCallback("neither fragment nor query string present".into())
        })?;
    let pairs = form_urlencoded::parse(raw.as_bytes()).into_owned();
    Ok(pairs.collect())
}

/// Checks a redirect before any token material in it is trusted.
///
/// A server-reported `error` is rejected before anything else is looked at. Then `state`
/// and `scope` must equal what was sent; a missing value counts as a mismatch.
pub fn validate_callback(
    response: &CallbackResponse,
    expected_scope: &str,
    expected_state: &str,
) -> Result<AuthorizationResponse> {
    if let Some(error) = response.get("error") {
        tracing::warn!(error, "authorization server rejected the request");
        return Err(AuthError::Server {
            error: error.to_string(),
            description: response.get("error_description").map(str::to_owned),
        }
        .into());
    }

    if response.get("state") != Some(expected_state) {
        tracing::warn!("authorization response carries an unexpected state");
        return Err(AuthError::StateMismatch.into());
    }

    let returned_scope = response.get("scope");
    if returned_scope != Some(expected_scope) {
        tracing::warn!(?returned_scope, "authorization response carries an unexpected scope");
        return Err(AuthError::ScopeMismatch {
            expected: expected_scope.to_string(),
            returned: returned_scope.map(str::to_owned),
        }
        .into());
    }

    if let Some(code) = response.get("code") {
        return Ok(AuthorizationResponse::Code(code.to_string()));
    }

    let Some(access_token) = response.get("access_token") else {
        return Err(AuthError::MissingField("code").into());
    };
    let expires_in = response
        .get("expires_in")
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| AuthError::MalformedCallback(format!("bad expires_in {s:?}")))
        })
        .transpose()?;
    let token = Token::issued(
        access_token,
        response.get("token_type").unwrap_or("Bearer"),
        expires_in,
        Timestamp::now(),
    )
    .with_scope(expected_scope);
    Ok(AuthorizationResponse::Token(token))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Option::<Raw>::deserialize(d)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Introspection result for an access token.
///
/// See: <https://developers.google.com/identity/protocols/oauth2/javascript-implicit-flow#tokeninfo-validation>
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    /// The client the token was issued to.
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub exp: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A client with only the token endpoint configured.
type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn bad_url(what: &'static str) -> impl FnOnce(url::ParseError) -> Error {
    move |e| Error::precondition(format!("invalid {what} url: {e}"))
}

fn token_type_name(token_type: &BasicTokenType) -> String {
    match token_type {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    }
}

/// Converts a token endpoint response, stamping it with the time it was received.
fn token_from_response(response: &BasicTokenResponse, received: Timestamp) -> Token {
    let mut token = Token::issued(
        response.access_token().secret(),
        token_type_name(response.token_type()),
        response.expires_in(),
        received,
    );
    token.refresh_token = response.refresh_token().map(|t| t.secret().clone());
    token.scope = response.scopes().map(|scopes| {
        let names: Vec<&str> = scopes.iter().map(|s| s.as_str()).collect();
        names.join(" ")
    });
    token
}

fn token_error<RE>(e: RequestTokenError<RE, BasicErrorResponse>) -> Error
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(response) => {
            if matches!(response.error(), BasicErrorResponseType::InvalidGrant) {
                tracing::warn!("token endpoint considers the grant invalid");
            }
            AuthError::Server {
                error: response.error().to_string(),
                description: response.error_description().cloned(),
            }
            .into()
        }
        RequestTokenError::Request(e) => Error::transport(format!("token request failed: {e}")),
        RequestTokenError::Parse(e, _) => {
            Error::transport(format!("malformed token endpoint response: {e}"))
        }
        RequestTokenError::Other(msg) => Error::transport(msg),
    }
}

/// Drives the OAuth 2.0 flows for one registered client.
///
/// Network operations share the executor's timeout and cancellation semantics: they
/// resolve to `Ok(None)` when cancelled through [`Self::canceller`].
#[derive(Debug)]
pub struct OAuthManager {
    config: OAuthConfig,
    executor: RequestExecutor,
    token_http: oauth2::reqwest::Client,
}

impl OAuthManager {
    /// Creates a manager with the default request timeout.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Self::with_options(config, &ClientOptions::default())
    }

    /// Creates a manager whose requests use `options` (timeout in particular).
    pub fn with_options(config: OAuthConfig, options: &ClientOptions) -> Result<Self> {
        let token_http = oauth2::reqwest::ClientBuilder::new()
            // token endpoints must answer directly
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::transport(format!("build token HTTP client: {e}")))?;
        Ok(Self {
            config,
            executor: RequestExecutor::new(options)?,
            token_http,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn canceller(&self) -> Canceller {
        self.executor.canceller()
    }

    /// Cancels the current token request, if any.
    pub fn cancel(&self) -> bool {
        self.executor.cancel()
    }

    /// Builds the URL to send the user's browser to.
    ///
    /// Pure: no network access, and the same inputs always give the same URL.
    pub fn build_authorization_url(&self, params: &AuthRequestParams) -> Result<Url> {
        let auth_url = AuthUrl::new(self.config.auth_url.clone());
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(auth_url.map_err(bad_url("authorization"))?)
            .set_redirect_uri(self.redirect_url()?);

        let state = CsrfToken::new(params.state.clone());
        let mut request = client
            .authorize_url(move || state)
            .add_scope(Scope::new(params.requested_scope().to_string()));
        request = match params.access_type {
            AccessType::Online => request.use_implicit_flow(),
            AccessType::Offline => request.add_extra_param("access_type", "offline"),
        };
        if let Some(prompt) = &params.prompt {
            request = request.add_extra_param("prompt", prompt.clone());
        }
        for (key, value) in params.extra.iter() {
            request = request.add_extra_param(key.to_string(), value.to_string());
        }

        let (url, _) = request.url();
        tracing::trace!(%url, "built authorization url");
        Ok(url)
    }

    fn redirect_url(&self) -> Result<RedirectUrl> {
        let url = RedirectUrl::new(self.config.redirect_uri.clone());
        url.map_err(bad_url("redirect"))
    }

    fn token_client(&self) -> Result<TokenClient> {
        let token_url = TokenUrl::new(self.config.token_url.clone());
        let mut client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_token_uri(token_url.map_err(bad_url("token"))?)
            .set_redirect_uri(self.redirect_url()?);
        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }

    /// Exchanges an authorization code for an access/refresh token pair.
    #[instrument(skip_all)]
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<Option<Token>> {
        let client = self.token_client()?;
        let code = AuthorizationCode::new(code.to_string());
        let token = self
            .executor
            .race(async {
                let response = client
                    .exchange_code(code)
                    .request_async(&self.token_http)
                    .await
                    .map_err(token_error)?;
                Ok::<_, Error>(token_from_response(&response, Timestamp::now()))
            })
            .await?;
        if token.is_some() {
            tracing::debug!("exchanged authorization code for token");
        }
        Ok(token)
    }

    /// Obtains a new access token with `refresh_token`.
    ///
    /// Google usually omits the refresh token from refresh responses; the returned token
    /// then carries the one that was passed in.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Option<Token>> {
        tracing::debug!("attempting to refresh OAuth token");
        let client = self.token_client()?;
        let refresh = RefreshToken::new(refresh_token.to_string());
        let token = self
            .executor
            .race(async {
                let response = client
                    .exchange_refresh_token(&refresh)
                    .request_async(&self.token_http)
                    .await
                    .map_err(token_error)?;
                Ok::<_, Error>(token_from_response(&response, Timestamp::now()))
            })
            .await?;

        Ok(token.map(|mut token| {
            if token.refresh_token.is_none() {
                tracing::trace!("new token lacks refresh token, preserving original");
                token.refresh_token = Some(refresh_token.to_string());
            } else {
                tracing::debug!("new token includes refresh token");
            }
            token
        }))
    }

    /// Checks `token` against the introspection endpoint.
    ///
    /// Fails with [`AuthError::AudienceMismatch`] if the token was issued to another
    /// client, and with [`AuthError::Server`] if the endpoint reports an error.
    #[instrument(skip_all)]
    pub async fn validate_access_token(&self, token: &Token) -> Result<Option<TokenInfo>> {
        let mut form = RequestOptions::new();
        form.set("access_token", &token.access_token);
        let url = self.config.tokeninfo_url.as_str();
        let request = ApiRequest::post(url).with_form(form);
        let Some(payload) = self.executor.execute(request).await? else {
            return Ok(None);
        };
        let info: TokenInfo = payload.into_json()?;

        if let Some(error) = info.error {
            return Err(AuthError::Server {
                error,
                description: info.error_description,
            }
            .into());
        }
        if info.aud.as_deref() != Some(self.config.client_id.as_str()) {
            tracing::warn!(aud = ?info.aud, "access token was issued to another client");
            return Err(AuthError::AudienceMismatch { returned: info.aud }.into());
        }

        tracing::debug!(scope = ?info.scope, "access token validated");
        Ok(Some(info))
    }

    /// Validates an authorization-code redirect and exchanges its code.
    pub async fn complete_code_grant(
        &self,
        response: &CallbackResponse,
        params: &AuthRequestParams,
    ) -> Result<Option<Token>> {
        match validate_callback(response, params.requested_scope(), &params.state)? {
            AuthorizationResponse::Code(code) => self.exchange_code_for_token(&code).await,
            AuthorizationResponse::Token(_) => Err(AuthError::MissingField("code").into()),
        }
    }

    /// Runs an implicit-grant redirect through extraction, validation and introspection.
    ///
    /// The returned token carries the scope reported by the introspection endpoint.
    pub async fn complete_implicit_grant(
        &self,
        callback_url: &str,
        params: &AuthRequestParams,
    ) -> Result<Option<Token>> {
        let response = extract_callback_response(callback_url)?;
        let mut token =
            match validate_callback(&response, params.requested_scope(), &params.state)? {
                AuthorizationResponse::Token(token) => token,
                AuthorizationResponse::Code(_) => {
                    return Err(AuthError::MissingField("access_token").into());
                }
            };
        let Some(info) = self.validate_access_token(&token).await? else {
            return Ok(None);
        };
        if let Some(scope) = info.scope {
            token.scope = Some(scope);
        }
        Ok(Some(token))
    }

    /// Returns `token` unchanged if still valid, or a refreshed token otherwise.
    ///
    /// Fails with [`Error::Precondition`] if the token is expired and cannot be refreshed,
    /// or lacks the fields needed to tell.
    #[instrument(skip_all)]
    pub async fn ensure_fresh(&self, token: Token) -> Result<Option<Token>> {
        if !token.is_expired()? {
            return Ok(Some(token));
        }
        tracing::debug!("access token expired, attempting refresh");
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(Error::precondition(
                "access token expired and no refresh token is available",
            ));
        };
        self.refresh_token(refresh_token).await
    }
}

impl Endpoint for OAuthManager {
    fn endpoint_url(&self) -> &str {
        &self.config.auth_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use jiff::SignedDuration;
    use pretty_assertions::assert_eq;

    const CLIENT_ID: &str = "client-123.apps.googleusercontent.com";

    fn manager() -> OAuthManager {
        let config = OAuthConfig::new(CLIENT_ID, "http://localhost:5500/oauth");
        OAuthManager::new(config.with_client_secret("shh")).unwrap()
    }

    fn query_of(url: &Url) -> IndexMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    fn callback(pairs: &[(&str, &str)]) -> CallbackResponse {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    #[test]
    fn offline_access_requests_a_code() {
        let params = AuthRequestParams::new("xyz", AccessType::Offline).with_prompt("consent");
        let url = manager().build_authorization_url(&params).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let q = query_of(&url);
        assert_eq!(q["response_type"], "code");
        assert_eq!(q["access_type"], "offline");
        assert_eq!(q["prompt"], "consent");
        assert_eq!(q["client_id"], CLIENT_ID);
        assert_eq!(q["redirect_uri"], "http://localhost:5500/oauth");
        assert_eq!(q["scope"], scope::YOUTUBE_FORCE_SSL);
        assert_eq!(q["state"], "xyz");
        assert!(!q.contains_key("client_secret"));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn online_access_uses_the_implicit_flow() {
        let params =
            AuthRequestParams::new("abc", AccessType::Online).with_scope(scope::YOUTUBE_READONLY);
        let url = manager().build_authorization_url(&params).unwrap();
        let q = query_of(&url);
        assert_eq!(q["response_type"], "token");
        assert!(!q.contains_key("access_type"));
        assert_eq!(q["scope"], scope::YOUTUBE_READONLY);
    }

    #[test]
    fn authorization_url_is_deterministic() {
        let m = manager();
        let mut params = AuthRequestParams::new("s", AccessType::Offline);
        params.extra.set("login_hint", "someone@example.com");
        let a = m.build_authorization_url(&params).unwrap();
        let b = m.build_authorization_url(&params).unwrap();
        assert_eq!(a, b);
        assert_eq!(query_of(&a)["login_hint"], "someone@example.com");
    }

    #[test]
    fn extract_prefers_fragment() {
        let r = extract_callback_response(
            "http://localhost/cb?ignored=1#access_token=ya29&state=s&scope=a%20b&expires_in=3599",
        )
        .unwrap();
        assert_eq!(r.get("access_token"), Some("ya29"));
        assert_eq!(r.get("scope"), Some("a b"));
        assert_eq!(r.get("ignored"), None);
    }

    #[test]
    fn extract_falls_back_to_query() {
        let r = extract_callback_response("http://localhost/cb?code=4%2F0A&state=s").unwrap();
        assert_eq!(r.get("code"), Some("4/0A"));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn extract_rejects_bare_urls() {
        for url in ["http://localhost/cb", "http://localhost/cb?#", "not a url"] {
            let err = extract_callback_response(url).unwrap_err();
            assert!(
                matches!(err, Error::Auth(AuthError::MalformedCallback(_))),
                "{url}: {err:?}"
            );
        }
    }

    #[test]
    fn server_error_is_rejected_before_state_check() {
        let r = callback(&[("error", "access_denied"), ("state", "wrong")]);
        let err = validate_callback(&r, scope::YOUTUBE, "expected").unwrap_err();
        assert!(matches!(
            err,
            Error::Auth(AuthError::Server { ref error, .. }) if error == "access_denied"
        ));
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let r = callback(&[
            ("code", "c"),
            ("state", "forged"),
            ("scope", scope::YOUTUBE),
        ]);
        let err = validate_callback(&r, scope::YOUTUBE, "expected").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
        let r = callback(&[("code", "c"), ("scope", scope::YOUTUBE)]);
        let err = validate_callback(&r, scope::YOUTUBE, "expected").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
    }

    #[test]
    fn downgraded_scope_is_rejected() {
        let r = callback(&[
            ("code", "c"),
            ("state", "s"),
            ("scope", scope::YOUTUBE_READONLY),
        ]);
        let err = validate_callback(&r, scope::YOUTUBE, "s").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        match err {
            Error::Auth(AuthError::ScopeMismatch { returned, .. }) => {
                assert_eq!(returned.as_deref(), Some(scope::YOUTUBE_READONLY));
            }
            other => panic!("Expected scope mismatch, got {:?}", other),
        }
    }

    #[test]
    fn valid_code_and_token_responses() {
        let r = callback(&[("code", "4/0A"), ("state", "s"), ("scope", scope::YOUTUBE)]);
        assert_eq!(
            validate_callback(&r, scope::YOUTUBE, "s").unwrap(),
            AuthorizationResponse::Code("4/0A".into())
        );

        let r = callback(&[
            ("access_token", "ya29"),
            ("token_type", "Bearer"),
            ("expires_in", "3599"),
            ("state", "s"),
            ("scope", scope::YOUTUBE),
        ]);
        let AuthorizationResponse::Token(token) =
            validate_callback(&r, scope::YOUTUBE, "s").unwrap()
        else {
            panic!("expected a token");
        };
        assert_eq!(token.access_token, "ya29");
        assert_eq!(token.expires_in, Some(3599));
        assert!(token.created.is_some());
        assert!(!token.is_expired().unwrap());
    }

    #[test]
    fn response_without_code_or_token() {
        let r = callback(&[("state", "s"), ("scope", scope::YOUTUBE)]);
        let err = validate_callback(&r, scope::YOUTUBE, "s").unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::MissingField(_))));
    }

    #[test]
    fn tokeninfo_accepts_string_numbers() {
        let info: TokenInfo = serde_json::from_str(
            r#"{"aud": "client", "scope": "s", "exp": "1700000000", "expires_in": 3599}"#,
        )
        .unwrap();
        assert_eq!(info.exp, Some(1_700_000_000));
        assert_eq!(info.expires_in, Some(3599));
    }

    #[test]
    fn secrets_stay_out_of_debug_output() {
        let m = manager();
        assert!(!format!("{:?}", m.config()).contains("shh"));
        let r = callback(&[("code", "4/0A-secret"), ("state", "s")]);
        assert!(!format!("{r:?}").contains("4/0A-secret"));
    }

    #[tokio::test]
    async fn ensure_fresh_requires_refresh_token_when_expired() {
        let token = Token::issued(
            "ya29",
            "Bearer",
            Some(Duration::from_secs(60)),
            Timestamp::now() - SignedDuration::from_secs(100),
        );
        let err = manager().ensure_fresh(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[tokio::test]
    async fn ensure_fresh_keeps_valid_tokens() {
        let token = Token::issued(
            "ya29",
            "Bearer",
            Some(Duration::from_secs(3600)),
            Timestamp::now(),
        );
        let same = manager().ensure_fresh(token.clone()).await.unwrap();
        assert_eq!(same, Some(token));
    }
}
