//! In-flight protocol state: authorization requests, the code index and
//! access tokens.
//!
//! The provider talks to this state through the [`AuthRequestStore`] and
//! [`AccessTokenStore`] traits so a persistent backend can replace
//! [`MemoryStore`] without touching protocol logic. `MemoryStore` keeps all
//! three maps behind a single mutex; every operation is a short, pure
//! in-memory critical section.

use crate::error::{ProviderError, ProviderResult};
use crate::oidc::auth_request::{AuthRequest, AuthRequestParams};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Access tokens are only used to fetch userinfo right after issuance.
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub id: Uuid,
    pub subject: String,
    pub scopes: Vec<String>,
    pub client_id: String,
    pub expires_at: OffsetDateTime,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

#[async_trait]
pub trait AuthRequestStore: Send + Sync {
    async fn create(&self, params: AuthRequestParams) -> ProviderResult<AuthRequest>;
    /// Fails with NotFound when the id is malformed or unknown.
    async fn by_id(&self, id: &str) -> ProviderResult<AuthRequest>;
    async fn by_code(&self, code: &str) -> ProviderResult<AuthRequest>;
    /// Last write wins: a second code replaces the first one.
    async fn save_code(&self, id: &str, code: &str) -> ProviderResult<()>;
    /// Removes the request and its code. Deleting twice fails with NotFound.
    async fn delete(&self, id: &str) -> ProviderResult<()>;
    /// Record the authenticated subject. Re-settable, but never back to empty.
    async fn set_subject(&self, id: &str, subject: String) -> ProviderResult<AuthRequest>;

    async fn health(&self) -> ProviderResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn issue(
        &self,
        subject: &str,
        scopes: &[String],
        client_id: &str,
    ) -> ProviderResult<AccessToken>;
    async fn health(&self) -> ProviderResult<()> {
        Ok(())
    }
    /// Fails with BadRequest for malformed, unknown or expired tokens.
    async fn token(&self, token_id: &str) -> ProviderResult<AccessToken>;
}

#[derive(Default)]
struct StoreInner {
    requests: HashMap<Uuid, AuthRequest>,
    request_by_code: HashMap<String, Uuid>,
    tokens: HashMap<Uuid, AccessToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| ProviderError::Internal("request store mutex poisoned".into()))
    }

    pub fn pending_requests(&self) -> ProviderResult<usize> {
        Ok(self.lock()?.requests.len())
    }
}

fn parse_request_id(id: &str) -> ProviderResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ProviderError::not_found("no auth request with that id"))
}

#[async_trait]
impl AuthRequestStore for MemoryStore {
    async fn create(&self, params: AuthRequestParams) -> ProviderResult<AuthRequest> {
        let request = AuthRequest::new(params);
        self.lock()?.requests.insert(request.id, request.clone());
        tracing::debug!(
            auth_request_id = %request.id,
            client_id = %request.client_id(),
            "Auth request created"
        );
        Ok(request)
    }

    async fn by_id(&self, id: &str) -> ProviderResult<AuthRequest> {
        let id = parse_request_id(id)?;
        self.lock()?
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("no auth request with that id"))
    }

    async fn by_code(&self, code: &str) -> ProviderResult<AuthRequest> {
        let inner = self.lock()?;
        let id = inner
            .request_by_code
            .get(code)
            .ok_or_else(|| ProviderError::not_found("invalid code"))?;
        match inner.requests.get(id) {
            Some(request) => Ok(request.clone()),
            None => {
                tracing::error!(
                    auth_request_id = %id,
                    "Code is indexed but its auth request is gone"
                );
                Err(ProviderError::Internal(
                    "valid code without a backing auth request".into(),
                ))
            }
        }
    }

    async fn save_code(&self, id: &str, code: &str) -> ProviderResult<()> {
        let id = parse_request_id(id)?;
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| ProviderError::not_found("no auth request with that id"))?;
        if !request.auth_code.is_empty() {
            tracing::warn!(auth_request_id = %id, "Replacing previously issued code");
            inner.request_by_code.remove(&request.auth_code);
        }
        request.auth_code = code.to_string();
        inner.request_by_code.insert(code.to_string(), id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> ProviderResult<()> {
        let id = parse_request_id(id)?;
        let mut inner = self.lock()?;
        let request = inner
            .requests
            .remove(&id)
            .ok_or_else(|| ProviderError::not_found("no auth request with that id"))?;
        if !request.auth_code.is_empty() {
            inner.request_by_code.remove(&request.auth_code);
        }
        tracing::debug!(auth_request_id = %id, "Auth request deleted");
        Ok(())
    }

    async fn set_subject(&self, id: &str, subject: String) -> ProviderResult<AuthRequest> {
        if subject.is_empty() {
            return Err(ProviderError::bad_request("subject must not be empty"));
        }
        let id = parse_request_id(id)?;
        let mut inner = self.lock()?;
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| ProviderError::not_found("no auth request with that id"))?;
        request.subject = subject;
        Ok(request.clone())
    }

    async fn health(&self) -> ProviderResult<()> {
        let pending = self.pending_requests()?;
        tracing::debug!(pending_requests = pending, "Auth request store healthy");
        Ok(())
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn issue(
        &self,
        subject: &str,
        scopes: &[String],
        client_id: &str,
    ) -> ProviderResult<AccessToken> {
        let now = OffsetDateTime::now_utc();
        let token = AccessToken {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            scopes: scopes.to_vec(),
            client_id: client_id.to_string(),
            expires_at: now + ACCESS_TOKEN_LIFETIME,
        };
        let mut inner = self.lock()?;
        // Tokens have a fixed short lifetime, so expired ones are dropped here.
        inner.tokens.retain(|_, t| t.expires_at > now);
        inner.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn token(&self, token_id: &str) -> ProviderResult<AccessToken> {
        let id = Uuid::parse_str(token_id)
            .map_err(|_| ProviderError::bad_request("malformed access token id"))?;
        let token = self
            .lock()?
            .tokens
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::bad_request("unknown access token"))?;
        if token.is_expired() {
            return Err(ProviderError::bad_request("access token expired"));
        }
        Ok(token)
    }

    async fn health(&self) -> ProviderResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn params() -> AuthRequestParams {
        AuthRequestParams {
            client_id: "c1".into(),
            redirect_uri: "https://app.example/callback".into(),
            scopes: vec!["openid".into()],
            response_type: "code".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_request_is_not_done() {
        let store = MemoryStore::new();
        let req = store.create(params()).await.unwrap();
        assert!(!req.done());
        assert!(req.auth_code.is_empty());
        let fetched = store.by_id(&req.id.to_string()).await.unwrap();
        assert_eq!(fetched, req);
    }

    #[tokio::test]
    async fn subject_marks_done_and_stays_done() {
        let store = MemoryStore::new();
        let id = store.create(params()).await.unwrap().id.to_string();

        let req = store.set_subject(&id, "kthid=u1".into()).await.unwrap();
        assert!(req.done());

        // Last write wins but the request never reverts to not-done.
        let req = store.set_subject(&id, "kthid=u2".into()).await.unwrap();
        assert!(req.done());
        assert_eq!(req.subject, "kthid=u2");
        assert!(store.set_subject(&id, String::new()).await.is_err());
        assert!(store.by_id(&id).await.unwrap().done());
    }

    #[tokio::test]
    async fn code_and_id_denote_same_request_until_deleted() {
        let store = MemoryStore::new();
        let id = store.create(params()).await.unwrap().id.to_string();
        store.save_code(&id, "abc").await.unwrap();

        let by_code = store.by_code("abc").await.unwrap();
        let by_id = store.by_id(&id).await.unwrap();
        assert_eq!(by_code, by_id);
        assert_eq!(by_id.auth_code, "abc");

        store.delete(&id).await.unwrap();
        assert!(matches!(store.by_id(&id).await, Err(ProviderError::NotFound(_))));
        assert!(matches!(store.by_code("abc").await, Err(ProviderError::NotFound(_))));
        assert!(matches!(store.delete(&id).await, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.by_id("not-a-uuid").await, Err(ProviderError::NotFound(_))));
        let unknown = Uuid::new_v4().to_string();
        assert!(matches!(store.by_id(&unknown).await, Err(ProviderError::NotFound(_))));
        assert!(matches!(
            store.save_code(&unknown, "x").await,
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            store.set_subject(&unknown, "kthid=u1".into()).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn saving_a_second_code_replaces_the_first() {
        let store = MemoryStore::new();
        let id = store.create(params()).await.unwrap().id.to_string();
        store.save_code(&id, "first").await.unwrap();
        store.save_code(&id, "second").await.unwrap();

        assert!(store.by_code("first").await.is_err());
        assert_eq!(store.by_code("second").await.unwrap().id.to_string(), id);

        store.delete(&id).await.unwrap();
        assert!(store.by_code("second").await.is_err());
    }

    #[tokio::test]
    async fn dangling_code_is_an_internal_fault() {
        let store = MemoryStore::new();
        store
            .lock()
            .unwrap()
            .request_by_code
            .insert("orphan".into(), Uuid::new_v4());
        assert!(matches!(
            store.by_code("orphan").await,
            Err(ProviderError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn issued_token_round_trips() {
        let store = MemoryStore::new();
        let scopes = vec!["openid".to_string(), "email".to_string()];
        let token = store.issue("u1", &scopes, "c1").await.unwrap();
        assert!(token.expires_at <= OffsetDateTime::now_utc() + ACCESS_TOKEN_LIFETIME);

        let fetched = store.token(&token.id.to_string()).await.unwrap();
        assert_eq!(fetched.subject, "u1");
        assert_eq!(fetched.scopes, scopes);
        assert_eq!(fetched.client_id, "c1");
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_are_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(store.token("garbage").await, Err(ProviderError::BadRequest(_))));
        assert!(matches!(
            store.token(&Uuid::new_v4().to_string()).await,
            Err(ProviderError::BadRequest(_))
        ));

        let token = store.issue("u1", &[], "c1").await.unwrap();
        store.lock().unwrap().tokens.get_mut(&token.id).unwrap().expires_at =
            OffsetDateTime::now_utc() - Duration::seconds(1);
        assert!(matches!(
            store.token(&token.id.to_string()).await,
            Err(ProviderError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_are_all_recorded() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.create(params()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.pending_requests().unwrap(), 32);
        assert!(AuthRequestStore::health(store.as_ref()).await.is_ok());
    }
}
