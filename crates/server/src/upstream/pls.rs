//! Fine-grained (per group) permission service client.

use super::{GroupPermissionService, check_status, join_url, path_segment, transport_error};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;

const SERVICE: &str = "pls";

#[derive(Clone)]
pub struct PlsClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlsClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GroupPermissionService for PlsClient {
    /// `GET /api/user/{kthid}/{group}` returning a list of permission names.
    #[tracing::instrument(skip(self))]
    async fn get_permissions(&self, kthid: &str, group: &str) -> ProviderResult<Vec<String>> {
        let url = join_url(
            &self.base_url,
            &format!("api/user/{}/{}", path_segment(kthid), path_segment(group)),
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| ProviderError::upstream(format!("invalid JSON from {SERVICE}: {e}")))
    }
}
