//! Server-side state of one authorization-code flow attempt.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The parameters a client sent to `/authorize`, after validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub response_type: String,
    pub response_mode: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Space separated `acr_values` as requested.
    pub acr_values: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthRequest {
    pub id: Uuid,
    pub params: AuthRequestParams,
    /// Empty until a code has been issued.
    pub auth_code: String,
    /// Empty until authentication completes; an encoded identity afterwards.
    pub subject: String,
}

impl AuthRequest {
    pub fn new(params: AuthRequestParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            params,
            auth_code: String::new(),
            subject: String::new(),
        }
    }

    pub fn done(&self) -> bool {
        !self.subject.is_empty()
    }

    pub fn client_id(&self) -> &str {
        &self.params.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.params.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.params.scopes
    }

    pub fn nonce(&self) -> Option<&str> {
        self.params.nonce.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.params.state.as_deref()
    }

    pub fn acr(&self) -> &str {
        self.params.acr_values.as_deref().unwrap_or_default()
    }

    /// ID tokens are only ever issued to the requesting client.
    pub fn audience(&self) -> Vec<String> {
        vec![self.params.client_id.clone()]
    }
}
