//! Per-user OAuth2 token lifecycle management for the Photolift wiki tools
//!
//! Photolift lets authenticated wiki editors transfer photos from Wikimedia
//! Commons or Geograph into a target MediaWiki installation. Every call made
//! to the wiki's REST API on a user's behalf needs that user's short-lived
//! bearer token, and the identity provider hands out rotating, single-use
//! refresh tokens. This crate owns that credential lifecycle: it caches the
//! usable token pair per subject, refreshes it on expiry, rotates the stored
//! refresh token in the same flow, and purges everything the moment the
//! provider declares a credential dead.
//!
//! Two cache slots exist per subject: a one-hour access slot holding the
//! token pair currently in use, and a 28-day refresh slot holding the pair
//! whose refresh token may be exchanged next. Concurrent requests that find
//! the access slot empty coalesce into a single refresh exchange; a
//! duplicate exchange would spend the single-use refresh token twice and
//! invalidate the sibling requests.
//!
//! Failures are kept apart by kind. A missing credential and a revoked
//! credential both surface as a denied [`TokenResult`] (the latter after
//! purging both slots), while a transient provider fault propagates as an
//! error without disturbing any cached state.
//!
//! ```no_run
//! use photolift_tokens::refresh::HttpRefreshTokenClient;
//! use photolift_tokens::{ClientId, ClientSecret, Principal, SubjectId, TokenHandler};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpRefreshTokenClient::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse("https://wiki.example.org/w/rest.php/oauth2/access_token")?,
//!     ClientId::from_static("client-id"),
//!     ClientSecret::from_static("client-secret"),
//! );
//! let handler = TokenHandler::new(client);
//!
//! let principal = Principal::authenticated(SubjectId::from_static("12345"));
//! let result = handler.get_token(&principal).await?;
//! if let Some(token) = result.token() {
//!     println!("bearer credential available: {}", token.access_token());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod cache;
pub mod handler;
mod principal;
pub mod refresh;
pub mod session;
mod tokens;

pub use braids::*;
pub use handler::{TokenHandler, TransientFailure};
pub use principal::Principal;
pub use tokens::{TokenResult, UserToken};
