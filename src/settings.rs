use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub environment: RunMode,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Identity {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Interpretation {
    pub url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    #[serde(default = "default_interpretation_timeout")]
    pub interpretation_timeout_secs: u64,
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            interpretation_timeout_secs: default_interpretation_timeout(),
            auth_timeout_secs: default_auth_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub postgres: Postgres,
    pub identity: Identity,
    pub interpretation: Interpretation,
    #[serde(default)]
    pub chat: Chat,
}

impl Settings {
    /// Loads the TOML file at `path`, then applies `EXPENSES__SECTION__KEY`
    /// environment overrides.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("EXPENSES").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_history_limit() -> i64 {
    100
}

fn default_interpretation_timeout() -> u64 {
    15
}

fn default_auth_timeout() -> u64 {
    5
}
