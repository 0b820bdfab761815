use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{catalog::ElectionId, secret::PasscodeHashing};

/// File the configuration is read from, relative to the working directory.
pub const CONFIG_FILE: &str = "Civic.toml";

/// Prefix of the environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "CIVIC_";

/// Application configuration, derived from `Civic.toml` and `CIVIC_*`
/// environment variables on top of built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    storage_path: PathBuf,
    catalog_path: PathBuf,
    passcode_hashing: PasscodeHashing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    election_id: Option<ElectionId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("civic-store.json"),
            catalog_path: PathBuf::from("demos/catalog.json"),
            passcode_hashing: PasscodeHashing::default(),
            election_id: None,
        }
    }
}

impl Config {
    /// The layered configuration sources, lowest priority first.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        debug!("Loaded config: {config:?}");
        Ok(config)
    }

    /// JSON file holding the persisted credentials and session.
    /// Configured via `CIVIC_STORAGE_PATH`.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// JSON seed with the elections, districts, teams and accounts.
    /// Configured via `CIVIC_CATALOG_PATH`.
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// How new passcodes and passwords are stored.
    /// Configured via `CIVIC_PASSCODE_HASHING`.
    pub fn passcode_hashing(&self) -> PasscodeHashing {
        self.passcode_hashing
    }

    /// Election the ballots are taken from, defaulting to the catalog's first.
    /// Configured via `CIVIC_ELECTION_ID`.
    pub fn election_id(&self) -> Option<ElectionId> {
        self.election_id
    }
}
