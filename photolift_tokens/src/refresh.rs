//! Exchanging refresh tokens with the wiki's identity provider
//!
//! The provider issues rotating, single-use refresh tokens: a successful
//! exchange invalidates the token that was presented and returns a fresh
//! pair. The [`TokenHandler`][crate::TokenHandler] therefore takes care to
//! run at most one exchange per subject at a time.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::tokens::UserToken;
use crate::{ClientId, ClientIdRef, ClientSecret, ClientSecretRef, RefreshTokenRef};

/// A client able to exchange a refresh token for the next token pair
#[async_trait]
pub trait RefreshTokenClient: Send + Sync {
    /// Exchanges `refresh_token` for a fresh token pair
    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<UserToken, RefreshError>;
}

/// An error from a refresh-token exchange
///
/// [`Rejected`][RefreshError::Rejected] means the presented refresh token is
/// invalid, expired, or revoked and will never work again; every other
/// variant is transient and leaves the stored credential worth retrying.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The authority definitively rejected the refresh token
    #[error("refresh token rejected by the authority (status {status})")]
    Rejected {
        /// The HTTP status returned by the authority (401 or 404)
        status: u16,
    },
    /// The authority answered with an unexpected error status
    #[error("error response from the authority: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error response
        body: String,
    },
    /// The request could not be sent
    #[error("error sending refresh request to the authority")]
    RequestSend(#[source] reqwest::Error),
    /// The response body could not be read
    #[error("error reading response body from the authority")]
    BodyRead(#[source] reqwest::Error),
    /// The token response could not be deserialized
    #[error("error deserializing token response from the authority")]
    TokenBody(#[from] serde_json::Error),
    /// A transport failure from a non-HTTP implementation
    #[error("transient failure communicating with the authority")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl RefreshError {
    /// Whether the refresh token itself was rejected as permanently dead
    ///
    /// A rejection means the subject's cached credentials must be purged;
    /// anything else must leave them untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RefreshError::Rejected { .. })
    }
}

/// The url-encoded body of a refresh exchange
#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a RefreshTokenRef,
    grant_type: &'static str,
}

/// Exchanges refresh tokens against the provider's token endpoint over HTTP
///
/// Client credentials ride as HTTP Basic authentication on the transport;
/// the form body carries only the refresh token and the grant type.
#[derive(Debug)]
pub struct HttpRefreshTokenClient {
    client: reqwest::Client,
    token_url: reqwest::Url,
    client_id: ClientId,
    client_secret: ClientSecret,
}

impl HttpRefreshTokenClient {
    /// Constructs a client against the given token endpoint
    pub fn new(
        client: reqwest::Client,
        token_url: reqwest::Url,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl RefreshTokenClient for HttpRefreshTokenClient {
    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<UserToken, RefreshError> {
        exchange_refresh_token(
            &self.client,
            self.token_url.clone(),
            &self.client_id,
            &self.client_secret,
            refresh_token,
        )
        .await
    }
}

#[tracing::instrument(
    err,
    skip_all,
    fields(token_url = %token_url, client_id = %client_id),
)]
async fn exchange_refresh_token(
    client: &reqwest::Client,
    token_url: reqwest::Url,
    client_id: &ClientIdRef,
    client_secret: &ClientSecretRef,
    refresh_token: &RefreshTokenRef,
) -> Result<UserToken, RefreshError> {
    tracing::trace!("exchanging refresh token with the authority");

    let resp = client
        .post(token_url)
        .basic_auth(client_id.as_str(), Some(client_secret.as_str()))
        .form(&RefreshTokenRequest {
            refresh_token,
            grant_type: "refresh_token",
        })
        .send()
        .await
        .map_err(RefreshError::RequestSend)?;

    let status = resp.status();
    tracing::debug!(
        response.status = status.as_u16(),
        "received token response from the authority"
    );

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
        return Err(RefreshError::Rejected {
            status: status.as_u16(),
        });
    }

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp.text().await.map_err(RefreshError::BodyRead)?;
        return Err(RefreshError::ErrorWithBody {
            source: error,
            body,
        });
    }

    let body = resp.bytes().await.map_err(RefreshError::BodyRead)?;
    let token: UserToken = serde_json::from_slice(&body)?;

    tracing::info!(
        token_type = token.token_type(),
        expires_in = token.expires_in().0,
        "received rotated token pair"
    );

    Ok(token)
}
