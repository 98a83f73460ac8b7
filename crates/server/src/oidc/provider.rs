//! The provider aggregate: stores, directories, claims and signing key behind
//! one [`ProviderStorage`] implementation.

use crate::config::AppConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::oidc::auth_request::{AuthRequest, AuthRequestParams};
use crate::oidc::claims::{ClaimsAssembler, UserInfo};
use crate::oidc::client::{self, Client, ClientDirectory, ClientRecord};
use crate::oidc::identity::{DbUserDirectory, Identity, UserDirectory, resolve_subject};
use crate::oidc::keys::KeyManager;
use crate::oidc::registrar::DbRegistrar;
use crate::oidc::storage::{IssuedToken, ProviderStorage};
use crate::oidc::store::{AccessTokenStore, AuthRequestStore, MemoryStore};
use crate::upstream::{self, HiveClient, PlsClient, RfingerClient, Unconfigured};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// Result of recording a successful login on an authorization request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    Authenticated(AuthRequest),
    /// A guest tried to log in to a client that only admits registered
    /// users. The request stays not-done.
    MissingAccount,
}

/// Deployment settings the provider needs at request time.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    /// Public base URL, e.g. `https://sso.example/op`. No trailing slash.
    pub issuer: String,
    pub login_url: String,
    pub dev: bool,
}

impl ProviderSettings {
    pub fn new(issuer: impl Into<String>, login_url: impl Into<String>, dev: bool) -> Self {
        Self {
            issuer: issuer.into().trim_end_matches('/').to_string(),
            login_url: login_url.into(),
            dev,
        }
    }
}

pub struct Provider {
    requests: Arc<dyn AuthRequestStore>,
    tokens: Arc<dyn AccessTokenStore>,
    clients: Arc<dyn ClientDirectory>,
    users: Arc<dyn UserDirectory>,
    claims: ClaimsAssembler,
    keys: Arc<KeyManager>,
    settings: ProviderSettings,
}

impl Provider {
    /// A provider with a fresh in-memory store.
    pub fn new(
        keys: Arc<KeyManager>,
        clients: Arc<dyn ClientDirectory>,
        users: Arc<dyn UserDirectory>,
        claims: ClaimsAssembler,
        settings: ProviderSettings,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            requests: store.clone(),
            tokens: store,
            clients,
            users,
            claims,
            keys,
            settings,
        }
    }

    /// Swap in other store implementations.
    pub fn with_stores(
        mut self,
        requests: Arc<dyn AuthRequestStore>,
        tokens: Arc<dyn AccessTokenStore>,
    ) -> Self {
        self.requests = requests;
        self.tokens = tokens;
        self
    }

    /// Wire up the SeaORM directories and the configured upstream services.
    pub fn from_config(
        config: &AppConfig,
        db: Arc<DatabaseConnection>,
        keys: Arc<KeyManager>,
    ) -> ProviderResult<Self> {
        let http = upstream::http_client(Duration::from_secs(config.upstream_timeout_secs))?;

        let permissions: Arc<dyn upstream::PermissionService> = match &config.hive {
            Some(hive) => Arc::new(HiveClient::new(http.clone(), &hive.url, &hive.api_key)),
            None => {
                tracing::warn!("hive is not configured; the permissions scope will fail");
                Arc::new(Unconfigured("hive"))
            }
        };
        let group_permissions: Arc<dyn upstream::GroupPermissionService> = match &config.pls {
            Some(pls) => Arc::new(PlsClient::new(http.clone(), &pls.url)),
            None => {
                tracing::warn!("pls is not configured; pls_* scopes will fail");
                Arc::new(Unconfigured("pls"))
            }
        };
        let pictures: Arc<dyn upstream::PictureService> = match &config.rfinger {
            Some(rfinger) => Arc::new(RfingerClient::new(http, &rfinger.url, &rfinger.api_key)),
            None => {
                tracing::warn!("rfinger is not configured; the picture scope will fail");
                Arc::new(Unconfigured("rfinger"))
            }
        };

        Ok(Self::new(
            keys,
            Arc::new(DbRegistrar::new(db.clone())),
            Arc::new(DbUserDirectory::new(db)),
            ClaimsAssembler::new(permissions, group_permissions, pictures),
            ProviderSettings::new(&config.issuer_url, &config.login_url, config.dev),
        ))
    }

    pub fn issuer(&self) -> &str {
        &self.settings.issuer
    }

    pub fn is_dev(&self) -> bool {
        self.settings.dev
    }

    /// Where the login subsystem sends the browser once authentication is
    /// recorded; the engine issues the code from there.
    pub fn auth_callback_url(&self, request_id: &str) -> String {
        format!(
            "{}/authorize/callback?id={}",
            self.settings.issuer,
            url::form_urlencoded::byte_serialize(request_id.as_bytes()).collect::<String>()
        )
    }

    async fn client_record(&self, client_id: &str) -> ProviderResult<ClientRecord> {
        self.clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| ProviderError::bad_request(format!("unknown client `{client_id}`")))
    }

    /// Record `identity` as the principal of request `id`, unless it is a guest
    /// and the request's client does not admit guests.
    #[tracing::instrument(
        skip(self, identity),
        fields(sub = identity.id(), guest = identity.is_guest())
    )]
    pub async fn mark_authenticated(
        &self,
        id: &str,
        identity: &Identity,
    ) -> ProviderResult<MarkOutcome> {
        let request = self.requests.by_id(id).await?;
        if identity.is_guest() {
            let client = self.client_record(request.client_id()).await?;
            if !client.allow_guests {
                tracing::info!(client_id = %client.id, "Guest login refused by client");
                return Ok(MarkOutcome::MissingAccount);
            }
        }
        let request = self.requests.set_subject(id, identity.to_subject()?).await?;
        tracing::info!(auth_request_id = %request.id, "Auth request authenticated");
        Ok(MarkOutcome::Authenticated(request))
    }

    /// Resolve an encoded subject to its identity.
    pub async fn identity(&self, subject: &str) -> ProviderResult<Identity> {
        resolve_subject(self.users.as_ref(), subject).await
    }
}

#[async_trait]
impl ProviderStorage for Provider {
    #[tracing::instrument(skip(self, params), fields(client_id = %params.client_id))]
    async fn create_auth_request(&self, params: AuthRequestParams) -> ProviderResult<AuthRequest> {
        self.requests.create(params).await
    }

    async fn auth_request_by_id(&self, id: &str) -> ProviderResult<AuthRequest> {
        self.requests.by_id(id).await
    }

    #[tracing::instrument(skip_all)]
    async fn auth_request_by_code(&self, code: &str) -> ProviderResult<AuthRequest> {
        self.requests.by_code(code).await
    }

    #[tracing::instrument(skip(self, code))]
    async fn save_auth_code(&self, id: &str, code: &str) -> ProviderResult<()> {
        self.requests.save_code(id, code).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_auth_request(&self, id: &str) -> ProviderResult<()> {
        self.requests.delete(id).await
    }

    #[tracing::instrument(skip(self, request), fields(auth_request_id = %request.id))]
    async fn create_access_token(&self, request: &AuthRequest) -> ProviderResult<IssuedToken> {
        if !request.done() {
            return Err(ProviderError::InvalidGrant(
                "auth request has not been authenticated".into(),
            ));
        }
        let token = self
            .tokens
            .issue(&request.subject, request.scopes(), request.client_id())
            .await?;
        Ok(IssuedToken {
            id: token.id,
            expires_at: token.expires_at,
        })
    }

    fn signing_key(&self) -> &KeyManager {
        &self.keys
    }

    async fn client_by_client_id(&self, client_id: &str) -> ProviderResult<Client> {
        let record = self.client_record(client_id).await?;
        Ok(Client::new(
            record,
            self.settings.login_url.clone(),
            self.settings.dev,
        ))
    }

    async fn authorize_client_id_secret(
        &self,
        client_id: &str,
        secret: &str,
    ) -> ProviderResult<()> {
        client::authorize_client_id_secret(self.clients.as_ref(), client_id, secret)
            .await
            .map(|_| ())
    }

    #[tracing::instrument(skip(self))]
    async fn userinfo_from_scopes(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
    ) -> ProviderResult<UserInfo> {
        let client = self.client_record(client_id).await?;
        let identity = self.identity(subject).await?;
        self.claims
            .assemble(&identity, scopes, client.permission_namespace.as_deref())
            .await
    }

    async fn health(&self) -> ProviderResult<()> {
        self.requests.health().await?;
        self.tokens.health().await
    }

    #[tracing::instrument(skip(self, token_id))]
    async fn userinfo_from_token(&self, token_id: &str, subject: &str) -> ProviderResult<UserInfo> {
        let token = self.tokens.token(token_id).await?;
        if token.subject != subject {
            tracing::warn!(
                token_client = %token.client_id,
                "Access token presented for a different subject"
            );
            return Err(ProviderError::bad_request(
                "access token was not issued to this subject",
            ));
        }
        self.userinfo_from_scopes(&token.subject, &token.client_id, &token.scopes)
            .await
    }
}
