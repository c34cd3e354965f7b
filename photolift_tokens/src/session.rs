//! Hooks tying the token lifecycle into the host's cookie session layer
//!
//! The embedding application wires these into its session framework:
//! [`SessionEvents::validate_principal`] on every request carrying a session
//! cookie, and [`SessionEvents::on_sign_out`] ahead of the framework's own
//! sign-out.

use std::sync::Arc;

use crate::handler::{TokenHandler, TransientFailure};
use crate::principal::Principal;
use crate::refresh::RefreshTokenClient;

/// Verdict on a session principal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionValidation {
    /// The session may continue
    Valid,
    /// The credential is gone; the framework should reject the principal
    /// and force re-authentication
    Reject,
}

/// Session-layer hooks over a shared [`TokenHandler`]
#[derive(Debug)]
pub struct SessionEvents<C> {
    handler: Arc<TokenHandler<C>>,
}

impl<C> SessionEvents<C> {
    /// Constructs the hooks over a shared handler
    pub fn new(handler: Arc<TokenHandler<C>>) -> Self {
        Self { handler }
    }
}

impl<C> Clone for SessionEvents<C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C: RefreshTokenClient> SessionEvents<C> {
    /// Decides whether the principal's session may continue
    ///
    /// A strictly read path: side effects are limited to cache population
    /// inside the handler. A transient refresh failure propagates instead of
    /// rejecting, so an identity-provider outage does not sign everyone out.
    pub async fn validate_principal(
        &self,
        principal: &Principal,
    ) -> Result<SessionValidation, TransientFailure> {
        let token = self.handler.get_token(principal).await?;
        if token.is_success() {
            Ok(SessionValidation::Valid)
        } else {
            tracing::info!("session principal has no refreshable credential; rejecting");
            Ok(SessionValidation::Reject)
        }
    }

    /// Purges cached credentials as part of sign-out
    ///
    /// Runs before the framework's own sign-out; idempotent.
    pub async fn on_sign_out(&self, principal: &Principal) {
        self.handler.remove_token(principal).await;
    }
}
