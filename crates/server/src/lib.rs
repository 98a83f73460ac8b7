//! An OpenID Connect provider for institutional single sign-on.
//!
//! The crate implements the authorization-code flow on top of an external
//! login subsystem: it tracks in-flight authorization requests, authenticates
//! clients, issues short-lived access tokens and RS256 ID tokens, and
//! assembles scope-gated claims from the user directory and the permission
//! and picture services.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oidc;
pub mod upstream;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
