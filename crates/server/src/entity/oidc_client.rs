//! OpenID Connect client entity.
//!
//! Rows are owned by the admin console; the provider only reads them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oidc_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// SHA-256 of the decoded client secret. The raw secret is never stored.
    pub secret_hash: Vec<u8>,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    pub allow_guests: bool,
    /// Namespace ("system") used when querying the coarse permission service.
    pub permission_namespace: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }
}
