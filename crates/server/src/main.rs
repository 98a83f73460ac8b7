use sea_orm::Database;
use sso_provider::AppResources;
use sso_provider::api::start_webserver;
use sso_provider::config::load_config_or_panic;
use sso_provider::oidc::{KeyManager, OidcState, Provider};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "sso_provider=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_standard_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());
    tracing::info!(?config, "Configuration loaded");

    // Unusable signing material is fatal: refuse to start.
    let keys = Arc::new(KeyManager::from_config(&config.signing_key)?);

    // Set up SeaORM database connection
    let db = Arc::new(Database::connect(&config.database_url).await?);

    let provider = Arc::new(Provider::from_config(&config, db.clone(), keys)?);
    if provider.is_dev() {
        tracing::warn!("Running in development mode");
    }

    let resources = AppResources { db, config };
    start_webserver(OidcState::new(provider), resources).await
}
