//! Coarse permission service client.

use super::{
    Permission, PermissionService, check_status, join_url, path_segment, transport_error,
};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;

const SERVICE: &str = "hive";

#[derive(Clone)]
pub struct HiveClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HiveClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PermissionService for HiveClient {
    /// `GET /api/v1/user/{kthid}/permissions`, impersonating the namespace.
    #[tracing::instrument(skip(self))]
    async fn get_permissions(
        &self,
        kthid: &str,
        namespace: &str,
    ) -> ProviderResult<Vec<Permission>> {
        let url = join_url(
            &self.base_url,
            &format!("api/v1/user/{}/permissions", path_segment(kthid)),
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("X-Hive-Impersonate-System", namespace)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        response
            .json::<Vec<Permission>>()
            .await
            .map_err(|e| ProviderError::upstream(format!("invalid JSON from {SERVICE}: {e}")))
    }
}
