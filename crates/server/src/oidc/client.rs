//! Relying-party clients as the protocol engine sees them, plus client
//! authentication.

use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::form_urlencoded;

/// Scopes this provider understands. A trailing `*` matches any suffix.
pub const SUPPORTED_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "pls_*",
    "permissions",
    "picture",
    "year_tag",
];

/// Accepted by the engine but never yields a refresh token.
pub const OFFLINE_ACCESS: &str = "offline_access";

pub const CLOCK_SKEW: Duration = Duration::from_secs(10);
pub const ID_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Whether `scope` matches the supported scope set.
pub fn is_scope_supported(scope: &str) -> bool {
    SUPPORTED_SCOPES.iter().any(|supported| match supported.strip_suffix('*') {
        Some(prefix) => scope.len() > prefix.len() && scope.starts_with(prefix),
        None => *supported == scope,
    })
}

/// A client as stored in the external directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: String,
    pub secret_hash: Vec<u8>,
    pub redirect_uris: Vec<String>,
    pub allow_guests: bool,
    pub permission_namespace: Option<String>,
}

/// Read access to the client directory. Create, update and delete belong to
/// the admin console.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn get_client(&self, client_id: &str) -> ProviderResult<Option<ClientRecord>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    ClientSecretBasic,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::ClientSecretBasic => "client_secret_basic",
        }
    }
}

/// The view of a client handed to the protocol engine.
#[derive(Clone, Debug)]
pub struct Client {
    record: ClientRecord,
    login_url: String,
    dev_mode: bool,
}

impl Client {
    pub fn new(record: ClientRecord, login_url: impl Into<String>, dev_mode: bool) -> Self {
        Self {
            record,
            login_url: login_url.into(),
            dev_mode,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn redirect_uris(&self) -> &[String] {
        &self.record.redirect_uris
    }

    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.record.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    pub fn grant_types(&self) -> &'static [GrantType] {
        &[GrantType::AuthorizationCode]
    }

    pub fn auth_method(&self) -> AuthMethod {
        AuthMethod::ClientSecretBasic
    }

    pub fn response_types(&self) -> &'static [&'static str] {
        &["code"]
    }

    pub fn allow_guests(&self) -> bool {
        self.record.allow_guests
    }

    pub fn permission_namespace(&self) -> Option<&str> {
        self.record.permission_namespace.as_deref()
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    pub fn clock_skew(&self) -> Duration {
        CLOCK_SKEW
    }

    pub fn id_token_lifetime(&self) -> Duration {
        ID_TOKEN_LIFETIME
    }

    /// Claims released through userinfo are also asserted in the ID token.
    pub fn id_token_userinfo_claims_assertion(&self) -> bool {
        true
    }

    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        let allowed = is_scope_supported(scope);
        if !allowed {
            tracing::debug!(client_id = %self.record.id, scope, "Rejected unsupported scope");
        }
        allowed
    }

    /// Where unauthenticated users go. The login subsystem sends them on to
    /// `next_url` once a principal is established.
    pub fn login_url(&self, next_url: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("next-url", next_url)
            .finish();
        let separator = if self.login_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.login_url)
    }
}

/// Hash a presented secret the same way the admin console hashed it on
/// creation: SHA-256 over the base64url-decoded bytes.
pub fn hash_client_secret(encoded_secret: &str) -> ProviderResult<Vec<u8>> {
    let secret = URL_SAFE
        .decode(encoded_secret)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded_secret))
        .map_err(|_| ProviderError::InvalidClient("invalid secret format".into()))?;
    Ok(Sha256::digest(&secret).to_vec())
}

/// Constant-time comparison: XOR-accumulates every byte pair so the running
/// time does not depend on where the first mismatch is.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authenticate a client by id and presented secret.
#[tracing::instrument(skip(directory, presented_secret))]
pub async fn authorize_client_id_secret(
    directory: &dyn ClientDirectory,
    client_id: &str,
    presented_secret: &str,
) -> ProviderResult<ClientRecord> {
    let record = directory
        .get_client(client_id)
        .await?
        .ok_or_else(|| ProviderError::InvalidClient("no such client".into()))?;
    let presented_hash = hash_client_secret(presented_secret)?;
    if !constant_time_eq(&presented_hash, &record.secret_hash) {
        tracing::warn!(client_id, "Client presented an invalid secret");
        return Err(ProviderError::InvalidClient("invalid client secret".into()));
    }
    Ok(record)
}
