//! Database-backed client directory.

use crate::entity::oidc_client;
use crate::error::ProviderResult;
use crate::oidc::client::{ClientDirectory, ClientRecord};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;

impl From<oidc_client::Model> for ClientRecord {
    fn from(model: oidc_client::Model) -> Self {
        let redirect_uris = model.redirect_uris_list();
        Self {
            id: model.id,
            secret_hash: model.secret_hash,
            redirect_uris,
            allow_guests: model.allow_guests,
            permission_namespace: model.permission_namespace.filter(|ns| !ns.is_empty()),
        }
    }
}

/// Reads clients from the `oidc_client` table maintained by the admin console.
#[derive(Clone)]
pub struct DbRegistrar {
    db: Arc<DatabaseConnection>,
}

impl DbRegistrar {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClientDirectory for DbRegistrar {
    #[tracing::instrument(skip(self))]
    async fn get_client(&self, client_id: &str) -> ProviderResult<Option<ClientRecord>> {
        Ok(oidc_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .map(ClientRecord::from))
    }
}
