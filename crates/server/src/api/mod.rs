//! API module providing the HTTP surface of the provider.
//!
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OpenID Connect endpoints live in [`crate::oidc::endpoints`] and are
//! nested under the issuer path.

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::oidc::{self, OidcState};
use axum::{Router, http::StatusCode};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the complete application router.
///
/// Every request gets the same deadline the upstream HTTP client uses, so no
/// outbound call outlives the request that caused it.
pub fn app(oidc_state: OidcState, app_resources: AppResources) -> Router {
    let issuer_path = app_resources.config.issuer_path();
    let timeout = Duration::from_secs(app_resources.config.upstream_timeout_secs.saturating_mul(2));

    let oidc_router = oidc::router(oidc_state.clone());
    let builder = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi());
    let builder = if issuer_path.is_empty() {
        builder.merge(oidc_router)
    } else {
        builder.nest(&issuer_path, oidc_router)
    };

    let (router, api) = builder
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(axum::Extension(oidc_state))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(oidc_state, app_resources))]
pub async fn start_webserver(
    oidc_state: OidcState,
    app_resources: AppResources,
) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = app(oidc_state, app_resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
