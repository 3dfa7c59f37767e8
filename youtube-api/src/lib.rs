//! Client for the YouTube Data API v3.
//!
//! The endpoint clients ([`SearchClient`], [`VideosClient`], [`CaptionsClient`]) are thin
//! wrappers over three shared pieces:
//!
//! - [`executor`]: one HTTP call raced against a timeout, with cooperative cancellation;
//! - [`pagination`]: a cursor that advances exactly one page per call for a given query;
//! - [`oauth`]: the OAuth 2.0 authorization-code and implicit grants, token
//!   introspection, expiry and refresh.
//!
//! Every operation returns [`Result`]. A cancelled call resolves to `Ok(None)`, never to
//! an error.
//!
//! ```no_run
//! # async fn run() -> youtube_api::Result<()> {
//! use youtube_api::{RequestOptions, SearchClient};
//!
//! let mut search = SearchClient::new(
//!     RequestOptions::new()
//!         .with("key", "AIza...")
//!         .with("maxResults", 25)
//!         .with("timeout", 2000),
//! )?;
//! let first = search.search("rust async").await?;
//! let second = search.search("rust async").await?;
//! # Ok(())
//! # }
//! ```

pub mod endpoints;
pub mod error;
pub mod executor;
pub mod oauth;
pub mod options;
pub mod pagination;
pub mod query;
pub mod token;

pub use endpoints::Endpoint;
pub use endpoints::captions::{CaptionFormat, CaptionPart, CaptionsClient};
pub use endpoints::search::{SearchClient, SearchResult};
pub use endpoints::videos::{Video, VideoPart, VideosClient};
pub use error::{ApiErrorDetail, AuthError, Error, ErrorKind, Result};
pub use executor::{ApiRequest, Canceller, Payload, PendingRequest, RequestExecutor};
pub use oauth::{AccessType, AuthRequestParams, OAuthConfig, OAuthManager, TokenInfo};
pub use options::{ClientOptions, ParamValue, RequestOptions};
pub use pagination::{Advance, CursorState, Page, PaginationCursor};
pub use token::Token;
