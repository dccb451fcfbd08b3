use serde::Deserialize;
use uuid::Uuid;

pub const DEFAULT_TELL_TIMEOUT_MS: u64 = 4000;

/// Settings for a kite, read from a config file and `KITE_*` environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KiteConfig {
    pub username: String,
    pub environment: String,
    pub region: String,
    pub id: String,
    pub disable_authentication: bool,
    /// hex encoded secp256k1 secret used to issue and check tokens for this kite
    pub private_key: Option<String>,
    /// hex encoded public key of kontrol, the trust root for kite keys
    pub kontrol_key: Option<String>,
    pub tell_timeout_ms: u64,
}

impl Default for KiteConfig {
    fn default() -> Self {
        KiteConfig {
            username: String::from("unknown"),
            environment: String::from("unknown"),
            region: String::from("unknown"),
            id: String::new(),
            disable_authentication: false,
            private_key: None,
            kontrol_key: None,
            tell_timeout_ms: DEFAULT_TELL_TIMEOUT_MS,
        }
    }
}

impl KiteConfig {
    /// Load `config_name` (any format the config crate understands, extension optional)
    /// and overlay `KITE_*` environment variables. A missing file is not an error.
    pub fn load(config_name: &str) -> crate::Result<KiteConfig> {
        let mut settings = config::Config::default();
        settings.merge(config::File::with_name(config_name).required(false))?;
        settings.merge(config::Environment::with_prefix("KITE"))?;

        let mut kite_config: KiteConfig = settings.try_into()?;
        if kite_config.id.is_empty() {
            kite_config.id = Uuid::new_v4().to_string();
        }
        Ok(kite_config)
    }
}
