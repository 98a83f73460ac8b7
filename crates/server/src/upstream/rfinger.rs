//! Profile picture service client.

use super::{PictureService, check_status, join_url, path_segment, transport_error};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;

const SERVICE: &str = "rfinger";

#[derive(Clone)]
pub struct RfingerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RfingerClient {
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
impl PictureService for RfingerClient {
    /// `GET /api/{kthid}?quality=true`; the body is the picture URL.
    #[tracing::instrument(skip(self))]
    async fn get_picture(&self, kthid: &str) -> ProviderResult<String> {
        let url = join_url(&self.base_url, &format!("api/{}", path_segment(kthid)));
        let response = self
            .http
            .get(&url)
            .query(&[("quality", "true")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let picture = response
            .text()
            .await
            .map_err(|e| ProviderError::upstream(format!("unreadable body from {SERVICE}: {e}")))?;
        let picture = picture.trim();
        if picture.is_empty() {
            return Err(ProviderError::upstream(format!("empty picture from {SERVICE}")));
        }
        Ok(picture.to_string())
    }
}
