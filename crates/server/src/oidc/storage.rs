//! The operation set the protocol engine drives.
//!
//! Everything the `/authorize`, `/token` and `/userinfo` handlers need goes
//! through [`ProviderStorage`]; the handlers never reach into the stores or
//! directories directly. Operations this provider deliberately does not
//! support are part of the trait too and fail with
//! [`ProviderError::Unimplemented`].

use crate::error::{ProviderError, ProviderResult};
use crate::oidc::auth_request::{AuthRequest, AuthRequestParams};
use crate::oidc::claims::UserInfo;
use crate::oidc::client::Client;
use crate::oidc::keys::{JwkSet, KeyManager};
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// An issued access token as handed back to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub id: Uuid,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait ProviderStorage: Send + Sync {
    async fn create_auth_request(&self, params: AuthRequestParams) -> ProviderResult<AuthRequest>;
    async fn auth_request_by_id(&self, id: &str) -> ProviderResult<AuthRequest>;
    async fn auth_request_by_code(&self, code: &str) -> ProviderResult<AuthRequest>;
    async fn save_auth_code(&self, id: &str, code: &str) -> ProviderResult<()>;
    async fn delete_auth_request(&self, id: &str) -> ProviderResult<()>;

    /// Issue an access token for a completed authorization request.
    async fn create_access_token(&self, request: &AuthRequest) -> ProviderResult<IssuedToken>;

    async fn create_access_and_refresh_tokens(
        &self,
        _request: &AuthRequest,
    ) -> ProviderResult<(IssuedToken, String)> {
        Err(ProviderError::Unimplemented("refresh tokens"))
    }

    async fn token_request_by_refresh_token(
        &self,
        _refresh_token: &str,
    ) -> ProviderResult<AuthRequest> {
        Err(ProviderError::Unimplemented("refresh token exchange"))
    }

    async fn terminate_session(&self, _subject: &str, _client_id: &str) -> ProviderResult<()> {
        Err(ProviderError::Unimplemented("session termination"))
    }

    async fn revoke_token(
        &self,
        _token: &str,
        _subject: Option<&str>,
        _client_id: &str,
    ) -> ProviderResult<()> {
        Err(ProviderError::Unimplemented("token revocation"))
    }

    async fn refresh_token_info(
        &self,
        _client_id: &str,
        _token: &str,
    ) -> ProviderResult<(String, Uuid)> {
        Err(ProviderError::Unimplemented("refresh token info"))
    }

    fn signing_key(&self) -> &KeyManager;

    /// JWKS. Always exactly one key.
    fn key_set(&self) -> JwkSet {
        self.signing_key().key_set()
    }

    async fn client_by_client_id(&self, client_id: &str) -> ProviderResult<Client>;

    async fn authorize_client_id_secret(&self, client_id: &str, secret: &str) -> ProviderResult<()>;

    /// Claims for the ID token of `subject` as seen by `client_id`.
    async fn userinfo_from_scopes(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
    ) -> ProviderResult<UserInfo>;

    /// Claims for the userinfo endpoint. The token must have been issued to
    /// `subject`.
    async fn userinfo_from_token(&self, token_id: &str, subject: &str) -> ProviderResult<UserInfo>;

    async fn introspection_from_token(
        &self,
        _token_id: &str,
        _subject: &str,
        _client_id: &str,
    ) -> ProviderResult<UserInfo> {
        Err(ProviderError::Unimplemented("token introspection"))
    }

    /// Extra claims for access tokens. None are ever added.
    async fn private_claims_from_scopes(
        &self,
        _subject: &str,
        _client_id: &str,
        _scopes: &[String],
    ) -> ProviderResult<BTreeMap<String, serde_json::Value>> {
        Ok(BTreeMap::new())
    }

    async fn key_by_id_and_client_id(&self, _key_id: &str, _client_id: &str) -> ProviderResult<()> {
        Err(ProviderError::Unimplemented("JWT profile client keys"))
    }

    async fn validate_jwt_profile_scopes(
        &self,
        _subject: &str,
        _scopes: &[String],
    ) -> ProviderResult<Vec<String>> {
        Err(ProviderError::Unimplemented("JWT profile grants"))
    }

    /// Whether in-flight protocol state can still be served.
    async fn health(&self) -> ProviderResult<()> {
        Ok(())
    }
}
