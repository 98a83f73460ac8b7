//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rsa::RsaPrivateKey;
use rsa::traits::PrivateKeyParts;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use sso_provider::config::AppConfig;
use sso_provider::error::{ProviderError, ProviderResult};
use sso_provider::oidc::auth_request::{AuthRequest, AuthRequestParams};
use sso_provider::oidc::store::{AccessToken, AccessTokenStore, AuthRequestStore};
use sso_provider::oidc::KeyManager;
use sso_provider::oidc::client::{ClientDirectory, ClientRecord, hash_client_secret};
use sso_provider::oidc::identity::{RegisteredUser, UserDirectory};
use sso_provider::oidc::keys::{MIN_KEY_BITS, PUBLIC_EXPONENT};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub const ISSUER: &str = "http://localhost:7000/op";
pub const LOGIN_URL: &str = "https://login.example/";
pub const REDIRECT_URI: &str = "https://app.example/callback";
pub const GUEST_REDIRECT_URI: &str = "https://guests.example/callback";

/// Raw client secret, base64url as handed out by the admin console.
pub fn client_secret() -> String {
    URL_SAFE.encode(b"integration-test-client-secret")
}

/// One key per test binary; generating RSA primes is slow.
pub fn test_keys() -> Arc<KeyManager> {
    static KEYS: OnceLock<Arc<KeyManager>> = OnceLock::new();
    KEYS.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, MIN_KEY_BITS).expect("generate key");
        let primes = key.primes();
        Arc::new(
            KeyManager::reconstruct(
                primes[0].clone(),
                primes[1].clone(),
                rsa::BigUint::from(PUBLIC_EXPONENT),
            )
            .expect("reconstruct key"),
        )
    })
    .clone()
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        issuer_url: ISSUER.into(),
        login_url: LOGIN_URL.into(),
        dev: true,
        signing_key: "unused-in-tests".into(),
        upstream_timeout_secs: 2,
        hive: None,
        pls: None,
        rfinger: None,
    }
}

/// SQLite database with the client and user directories seeded:
/// - client `app`: registered users only, permission namespace `app`
/// - client `guest-app`: admits guests, no permission namespace
/// - user `abc123`
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE oidc_client (
            id TEXT PRIMARY KEY,
            secret_hash BLOB NOT NULL,
            redirect_uris TEXT NOT NULL,
            allow_guests INTEGER NOT NULL DEFAULT 0,
            permission_namespace TEXT NULL
        );"#,
    ))
    .await
    .expect("create oidc_client table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            kthid TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL,
            family_name TEXT NOT NULL,
            year_tag TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    let hash = hash_client_secret(&client_secret()).expect("hash secret");
    let hex: String = hash.iter().map(|b| format!("{b:02X}")).collect();
    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        format!(
            r#"INSERT INTO oidc_client (id, secret_hash, redirect_uris, allow_guests, permission_namespace)
               VALUES ('app', X'{hex}', '["{REDIRECT_URI}"]', 0, 'app'),
                      ('guest-app', X'{hex}', '["{GUEST_REDIRECT_URI}"]', 1, NULL);"#
        ),
    ))
    .await
    .expect("insert clients");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"INSERT INTO users (kthid, email, first_name, family_name, year_tag)
           VALUES ('abc123', 'abc123@kth.se', 'Ada', 'Lovelace', 'D22');"#,
    ))
    .await
    .expect("insert user");

    Arc::new(db)
}

pub fn registered_user(kthid: &str) -> RegisteredUser {
    RegisteredUser {
        kthid: kthid.into(),
        email: format!("{kthid}@kth.se"),
        first_name: "Test".into(),
        family_name: "User".into(),
        year_tag: "D22".into(),
    }
}

/// In-memory client directory.
#[derive(Default)]
pub struct FakeClients(pub HashMap<String, ClientRecord>);

impl FakeClients {
    pub fn with(mut self, id: &str, allow_guests: bool, namespace: Option<&str>) -> Self {
        self.0.insert(
            id.to_string(),
            ClientRecord {
                id: id.to_string(),
                secret_hash: hash_client_secret(&client_secret()).expect("hash secret"),
                redirect_uris: vec![REDIRECT_URI.to_string()],
                allow_guests,
                permission_namespace: namespace.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl ClientDirectory for FakeClients {
    async fn get_client(&self, client_id: &str) -> ProviderResult<Option<ClientRecord>> {
        Ok(self.0.get(client_id).cloned())
    }
}

/// In-memory user directory.
#[derive(Default)]
pub struct FakeUsers(pub HashMap<String, RegisteredUser>);

impl FakeUsers {
    pub fn with(mut self, kthid: &str) -> Self {
        self.0.insert(kthid.to_string(), registered_user(kthid));
        self
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn get_user(&self, kthid: &str) -> ProviderResult<Option<RegisteredUser>> {
        Ok(self.0.get(kthid).cloned())
    }
}

/// A request/token backend that has lost its storage: every call fails.
pub struct UnavailableStore;

fn unavailable<T>() -> ProviderResult<T> {
    Err(ProviderError::Internal("store unavailable".into()))
}

#[async_trait]
impl AuthRequestStore for UnavailableStore {
    async fn create(&self, _params: AuthRequestParams) -> ProviderResult<AuthRequest> {
        unavailable()
    }
    async fn by_id(&self, _id: &str) -> ProviderResult<AuthRequest> {
        unavailable()
    }
    async fn by_code(&self, _code: &str) -> ProviderResult<AuthRequest> {
        unavailable()
    }
    async fn save_code(&self, _id: &str, _code: &str) -> ProviderResult<()> {
        unavailable()
    }
    async fn delete(&self, _id: &str) -> ProviderResult<()> {
        unavailable()
    }
    async fn set_subject(&self, _id: &str, _subject: String) -> ProviderResult<AuthRequest> {
        unavailable()
    }
    async fn health(&self) -> ProviderResult<()> {
        unavailable()
    }
}

#[async_trait]
impl AccessTokenStore for UnavailableStore {
    async fn issue(
        &self,
        _subject: &str,
        _scopes: &[String],
        _client_id: &str,
    ) -> ProviderResult<AccessToken> {
        unavailable()
    }
    async fn token(&self, _token_id: &str) -> ProviderResult<AccessToken> {
        unavailable()
    }
    async fn health(&self) -> ProviderResult<()> {
        unavailable()
    }
}
