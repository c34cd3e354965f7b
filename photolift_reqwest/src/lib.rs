//! Middleware that attaches a user's bearer token to outbound wiki API calls
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include a [`BearerTokenMiddleware`] in the middleware stack to have every
//! outbound request carry the access token of the principal on whose behalf
//! it is sent.
//!
//! "Who is the current principal" is a capability the embedding application
//! supplies as a [`PrincipalResolver`] — one implementation per deployment
//! mode (direct request handling, long-lived interactive circuits, batch
//! jobs). The middleware never reaches into ambient or thread-local state.
//!
//! If a request already specifies an `Authorization` header by the time the
//! middleware executes, the existing value is left in place. When no
//! credential is available the request goes out unauthenticated; the wiki's
//! own 401 is the acceptable terminal outcome for an un-refreshable session.
//!
//! ```no_run
//! use photolift_reqwest::BearerTokenMiddleware;
//! use photolift_tokens::refresh::HttpRefreshTokenClient;
//! use photolift_tokens::{ClientId, ClientSecret, Principal, SubjectId, TokenHandler};
//! use reqwest_middleware::ClientBuilder;
//! use std::sync::Arc;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = Arc::new(TokenHandler::new(HttpRefreshTokenClient::new(
//!     reqwest::Client::new(),
//!     reqwest::Url::parse("https://wiki.example.org/w/rest.php/oauth2/access_token")?,
//!     ClientId::from_static("client-id"),
//!     ClientSecret::from_static("client-secret"),
//! )));
//!
//! let resolver = || Principal::authenticated(SubjectId::from_static("12345"));
//!
//! let client = ClientBuilder::new(reqwest::Client::new())
//!     .with(BearerTokenMiddleware::new(handler, resolver))
//!     .build();
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

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use http::Extensions;
use photolift_tokens::handler::TokenHandler;
use photolift_tokens::refresh::RefreshTokenClient;
use photolift_tokens::{Principal, UserToken};
use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next, Result};

/// A capability that answers "who is the current principal" at call time
///
/// The authenticator can run outside the originating request's direct call
/// stack, so the principal is resolved through this explicitly supplied
/// capability rather than reconstructed from framework-ambient state.
pub trait PrincipalResolver: Send + Sync {
    /// Resolves the principal on whose behalf the next request is made
    fn current_principal(&self) -> Principal;
}

impl<F> PrincipalResolver for F
where
    F: Fn() -> Principal + Send + Sync,
{
    fn current_principal(&self) -> Principal {
        self()
    }
}

/// A middleware that injects the current user's access token into outgoing
/// requests
pub struct BearerTokenMiddleware<C, R> {
    handler: Arc<TokenHandler<C>>,
    resolver: R,
}

impl<C, R> BearerTokenMiddleware<C, R> {
    /// Constructs the middleware over a shared handler and a principal
    /// resolver
    pub fn new(handler: Arc<TokenHandler<C>>, resolver: R) -> Self {
        Self { handler, resolver }
    }
}

impl<C, R> fmt::Debug for BearerTokenMiddleware<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenMiddleware")
            .finish_non_exhaustive()
    }
}

fn bearer_header(token: &UserToken) -> Option<header::HeaderValue> {
    let access = token.access_token().as_str();
    let mut header_value = BytesMut::with_capacity(access.len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(access.as_bytes());
    match header::HeaderValue::from_maybe_shared(header_value.freeze()) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("access token contains bytes not permitted in a header");
            None
        }
    }
}

#[async_trait::async_trait]
impl<C, R> Middleware for BearerTokenMiddleware<C, R>
where
    C: RefreshTokenClient + 'static,
    R: PrincipalResolver + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !req.headers().contains_key(header::AUTHORIZATION) {
            let principal = self.resolver.current_principal();
            let result = self
                .handler
                .get_token(&principal)
                .await
                .map_err(reqwest_middleware::Error::middleware)?;

            match result.token().and_then(bearer_header) {
                Some(value) => {
                    req.headers_mut().insert(header::AUTHORIZATION, value);
                }
                None => {
                    tracing::debug!("no credential available; sending request unauthenticated");
                }
            }
        }

        next.run(req, extensions).await
    }
}
