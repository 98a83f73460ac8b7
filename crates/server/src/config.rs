use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Coarse permission service ("hive").
#[derive(Clone, Debug, Deserialize)]
pub struct HiveConfig {
    pub url: String,
    pub api_key: String,
}

/// Fine-grained permission service ("pls").
#[derive(Clone, Debug, Deserialize)]
pub struct PlsConfig {
    pub url: String,
}

/// Profile picture service ("rfinger").
#[derive(Clone, Debug, Deserialize)]
pub struct RfingerConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL of the provider, e.g. `https://sso.example.org/op`.
    pub issuer_url: String,
    /// Where the external login subsystem lives. Unauthenticated users are sent
    /// here with a `next-url` continuation parameter.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default)]
    pub dev: bool,
    /// Signing key as `"<p>,<q>"`: two base-62 encoded primes.
    pub signing_key: String,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default)]
    pub hive: Option<HiveConfig>,
    #[serde(default)]
    pub pls: Option<PlsConfig>,
    #[serde(default)]
    pub rfinger: Option<RfingerConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("listen_addr", &self.listen_addr)
            .field("issuer_url", &self.issuer_url)
            .field("login_url", &self.login_url)
            .field("dev", &self.dev)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("hive", &self.hive.as_ref().map(|h| &h.url))
            .field("pls", &self.pls.as_ref().map(|p| &p.url))
            .field("rfinger", &self.rfinger.as_ref().map(|r| &r.url))
            .finish_non_exhaustive()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:7000".to_string()
}

fn default_login_url() -> String {
    "/".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    5
}

impl AppConfig {
    /// Checks the values that deserialization alone cannot. The signing key is
    /// validated separately when the key manager reconstructs it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issuer = Url::parse(&self.issuer_url)
            .map_err(|e| ConfigError::Validation(format!("issuer_url is not a valid URL: {e}")))?;
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ConfigError::Validation(
                "issuer_url must not carry a query or fragment".into(),
            ));
        }
        if self.signing_key.trim().is_empty() {
            return Err(ConfigError::Validation("signing_key must be set".into()));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Path component of the issuer, where the protocol endpoints are mounted.
    pub fn issuer_path(&self) -> String {
        Url::parse(&self.issuer_url)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `HIVE__API_KEY`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
