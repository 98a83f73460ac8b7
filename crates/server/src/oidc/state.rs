//! Shared state for the protocol endpoints.

use crate::oidc::login::LoginBridge;
use crate::oidc::provider::Provider;
use crate::oidc::storage::ProviderStorage;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::sync::Arc;

#[derive(Clone)]
pub struct OidcState {
    pub provider: Arc<Provider>,
}

impl OidcState {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    pub fn storage(&self) -> &dyn ProviderStorage {
        self.provider.as_ref()
    }

    pub fn issuer(&self) -> &str {
        self.provider.issuer()
    }

    /// The bridge the login subsystem reports completed logins through.
    pub fn login_bridge(&self) -> LoginBridge {
        LoginBridge::new(self.provider.clone())
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.provider.issuer())
    }

    /// A fresh authorization code: 32 random bytes, base64url.
    pub fn generate_code() -> Result<String, getrandom::Error> {
        let mut bytes = [0u8; 32];
        getrandom::fill(&mut bytes)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}
