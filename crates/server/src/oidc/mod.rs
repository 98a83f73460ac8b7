//! OpenID Connect provider core.
//!
//! ## Components
//!
//! - `keys` - signing key reconstruction and JWKS
//! - `client` / `registrar` - client view and client authentication
//! - `store` - auth requests, the code index and access tokens
//! - `claims` - scope-gated claim assembly
//! - `login` - the bridge the login subsystem reports through
//! - `provider` - the aggregate implementing [`ProviderStorage`]
//! - `endpoints` - the HTTP surface driving it

pub mod auth_request;
pub mod claims;
pub mod client;
pub mod endpoints;
pub mod identity;
pub mod keys;
pub mod login;
pub mod provider;
mod registrar;
mod state;
pub mod storage;
pub mod store;

pub use endpoints::router;
pub use identity::{GuestUser, Identity, RegisteredUser};
pub use keys::KeyManager;
pub use login::{LoginBridge, LoginOutcome};
pub use provider::{MarkOutcome, Provider, ProviderSettings};
pub use registrar::DbRegistrar;
pub use state::OidcState;
pub use storage::ProviderStorage;

/// OpenAPI tag for OpenID Connect endpoints
pub const OIDC_TAG: &str = "OpenID Connect";
