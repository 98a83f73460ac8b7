//! Health check endpoint.

use crate::AppResources;
use crate::oidc::{OidcState, ProviderStorage};
use axum::{Extension, http::StatusCode};

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

/// Health check endpoint.
#[tracing::instrument(skip(resources, oidc))]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Returns `ok` when the database answers and the provider's request and token \
                   stores are serviceable.\n\n\
                   **Use cases:**\n\
                   - Kubernetes liveness/readiness probes\n\
                   - Load balancer health checks\n\n\
                   Supports both GET and HEAD methods for compatibility with various health check systems.",
    responses(
        (status = 200, description = "Service is healthy", body = str, content_type = "text/plain", example = "ok"),
        (status = 503, description = "The client/user directory or the provider state is unavailable", body = str, content_type = "text/plain")
    )
)]
pub async fn health(
    Extension(resources): Extension<AppResources>,
    Extension(oidc): Extension<OidcState>,
) -> (StatusCode, &'static str) {
    if let Err(e) = resources.db.ping().await {
        tracing::warn!(error = %e, "Database ping failed");
        return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
    }
    if let Err(e) = oidc.storage().health().await {
        tracing::warn!(error = %e, "Provider state unavailable");
        return (StatusCode::SERVICE_UNAVAILABLE, "provider unavailable");
    }
    (StatusCode::OK, "ok")
}
