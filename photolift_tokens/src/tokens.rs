use aliri_clock::DurationSecs;
use serde::Deserialize;

use crate::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// One OAuth2 credential pair as issued by the wiki's identity provider
///
/// Immutable once constructed. The field names match the provider's
/// snake_case wire format, so the token endpoint's JSON response
/// deserializes directly into this type.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserToken {
    token_type: String,
    expires_in: DurationSecs,
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

impl UserToken {
    /// Constructs a token pair from its wire components
    pub fn new(
        token_type: String,
        expires_in: DurationSecs,
        access_token: AccessToken,
        refresh_token: RefreshToken,
    ) -> Self {
        Self {
            token_type,
            expires_in,
            access_token,
            refresh_token,
        }
    }

    /// The token type reported by the provider, typically `Bearer`
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// The provider-reported lifetime of the access token
    ///
    /// Informational only: the cache slot's own expiration governs the
    /// actual reuse window.
    pub fn expires_in(&self) -> DurationSecs {
        self.expires_in
    }

    /// The bearer credential for calls to the wiki API
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The credential eligible for the next refresh exchange
    pub fn refresh_token(&self) -> &RefreshTokenRef {
        &self.refresh_token
    }
}

/// The uniform outcome of a token lookup
///
/// Wraps an optional [`UserToken`] so that "no credential available" and
/// "credential available" are represented the same way at every call site.
/// Used both as the cache payload and as the handler's return value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenResult {
    token: Option<UserToken>,
}

impl TokenResult {
    /// A successful outcome carrying a usable token pair
    pub fn granted(token: UserToken) -> Self {
        Self { token: Some(token) }
    }

    /// An unsuccessful outcome: no credential is available
    pub const fn denied() -> Self {
        Self { token: None }
    }

    /// Whether a usable token pair is present
    pub fn is_success(&self) -> bool {
        self.token.is_some()
    }

    /// The token pair, if the outcome was successful
    pub fn token(&self) -> Option<&UserToken> {
        self.token.as_ref()
    }

    /// Consumes the outcome, yielding the token pair if present
    pub fn into_token(self) -> Option<UserToken> {
        self.token
    }
}
