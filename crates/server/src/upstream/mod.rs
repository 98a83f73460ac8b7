//! Clients for the services claims are assembled from.
//!
//! - `hive` - coarse permissions within a client's namespace
//! - `pls` - fine-grained permissions per group
//! - `rfinger` - profile pictures
//!
//! Every failure (transport, status, body) is an upstream error. A requested
//! claim is never silently dropped because its service misbehaved.

pub mod hive;
pub mod pls;
pub mod rfinger;

use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use hive::HiveClient;
pub use pls::PlsClient;
pub use rfinger::RfingerClient;

/// One permission grant as returned by the coarse permission service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn get_permissions(&self, kthid: &str, namespace: &str)
    -> ProviderResult<Vec<Permission>>;
}

#[async_trait]
pub trait GroupPermissionService: Send + Sync {
    async fn get_permissions(&self, kthid: &str, group: &str) -> ProviderResult<Vec<String>>;
}

#[async_trait]
pub trait PictureService: Send + Sync {
    async fn get_picture(&self, kthid: &str) -> ProviderResult<String>;
}

/// Stand-in for a service that has no configuration. Any use fails loudly.
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl PermissionService for Unconfigured {
    async fn get_permissions(&self, _: &str, _: &str) -> ProviderResult<Vec<Permission>> {
        Err(ProviderError::upstream(format!("{} is not configured", self.0)))
    }
}

#[async_trait]
impl GroupPermissionService for Unconfigured {
    async fn get_permissions(&self, _: &str, _: &str) -> ProviderResult<Vec<String>> {
        Err(ProviderError::upstream(format!("{} is not configured", self.0)))
    }
}

#[async_trait]
impl PictureService for Unconfigured {
    async fn get_picture(&self, _: &str) -> ProviderResult<String> {
        Err(ProviderError::upstream(format!("{} is not configured", self.0)))
    }
}

/// Shared HTTP client. The timeout bounds every outbound call so a slow
/// upstream cannot outlive the inbound request it serves.
pub fn http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {e}")))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Percent-encode one URL path segment.
fn path_segment(segment: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(segment)
}

/// The services answer `200 OK` on success; anything else is a failure.
async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::OK {
        Ok(response)
    } else {
        Err(ProviderError::upstream(format!(
            "unexpected status code from {service}: {status}"
        )))
    }
}

fn transport_error(service: &'static str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::upstream(format!("{service} timed out"))
    } else {
        ProviderError::upstream(format!("{service} request failed: {e}"))
    }
}
