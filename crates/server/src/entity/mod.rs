//! SeaORM entities for the directories the provider reads.

pub mod oidc_client;
pub mod user;
