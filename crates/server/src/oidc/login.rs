//! Entry point for the login subsystem.
//!
//! Once a user has completed any authentication ceremony the login subsystem
//! calls [`LoginBridge::complete`] with the auth request id it was handed in
//! `next-url` and the established principal.

use crate::error::{ProviderError, ProviderResult};
use crate::oidc::identity::Identity;
use crate::oidc::provider::{MarkOutcome, Provider};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Send the browser here to continue the authorization flow.
    Redirect(String),
    /// The principal is a guest and the client only admits registered users.
    MissingAccount,
}

#[derive(Clone)]
pub struct LoginBridge {
    provider: Arc<Provider>,
}

impl LoginBridge {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    #[tracing::instrument(skip(self, identity), fields(sub = identity.id()))]
    pub async fn complete(
        &self,
        request_id: &str,
        identity: &Identity,
    ) -> ProviderResult<LoginOutcome> {
        match self.provider.mark_authenticated(request_id, identity).await {
            Ok(MarkOutcome::Authenticated(request)) => Ok(LoginOutcome::Redirect(
                self.provider.auth_callback_url(&request.id.to_string()),
            )),
            Ok(MarkOutcome::MissingAccount) => Ok(LoginOutcome::MissingAccount),
            Err(ProviderError::NotFound(_)) => {
                Err(ProviderError::bad_request("no such auth request"))
            }
            Err(e) => Err(e),
        }
    }
}
