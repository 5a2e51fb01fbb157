//! Configuration: `<home>/config.toml` overridden by environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dgrz_store::IpfsConfig;
use dgrz_types::{DgrzError, DgrzResult};
use serde::{Deserialize, Serialize};

/// Configuration file inside the home directory.
pub const CONFIG_FILE: &str = "config.toml";
/// Home directory override.
pub const ENV_HOME: &str = "DOGG3RZ_HOME";
/// Default grapplication override.
pub const ENV_GRAPP: &str = "DOGG3RZ_GRAPP";
/// State-store backend override.
pub const ENV_STATE_STORE: &str = "DOGG3RZ_STATE_STORE";

/// Where grapplication state lives. Only the filesystem is supported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateStore {
    #[default]
    File,
}

impl FromStr for StateStore {
    type Err = DgrzError;

    fn from_str(s: &str) -> DgrzResult<Self> {
        match s {
            "file" => Ok(Self::File),
            other => Err(DgrzError::invalid_value("unsupported state store").with_context("state_store", other)),
        }
    }
}

impl fmt::Display for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
        }
    }
}

/// Object-store backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    Memory,
    #[default]
    Local,
    Ipfs,
}

impl FromStr for ObjectStoreKind {
    type Err = DgrzError;

    fn from_str(s: &str) -> DgrzResult<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "local" => Ok(Self::Local),
            "ipfs" => Ok(Self::Ipfs),
            other => Err(DgrzError::invalid_value("unknown object store kind").with_context("kind", other)),
        }
    }
}

impl fmt::Display for ObjectStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::Ipfs => "ipfs",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub kind: ObjectStoreKind,
    pub ipfs_api: String,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        let ipfs = IpfsConfig::default();
        Self {
            kind: ObjectStoreKind::default(),
            ipfs_api: ipfs.api,
            connect_timeout_secs: ipfs.connect_timeout_secs,
            max_retries: ipfs.max_retries,
        }
    }
}

impl ObjectStoreConfig {
    pub fn ipfs(&self) -> IpfsConfig {
        IpfsConfig {
            api: self.ipfs_api.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
            max_retries: self.max_retries,
            ..IpfsConfig::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grapplication used when a command names none.
    pub default_grapp: Option<String>,
    pub state_store: StateStore,
    /// Branch `HEAD` points at in new grapplications.
    pub default_branch: String,
    /// First port handed out by the port allocator.
    pub port_base: u32,
    pub object_store: ObjectStoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_grapp: None,
            state_store: StateStore::File,
            default_branch: "main".to_string(),
            port_base: 10000,
            object_store: ObjectStoreConfig::default(),
        }
    }
}

/// Keys accepted by [`Config::get`] and [`Config::set`].
pub const KEYS: [&str; 8] = [
    "default_grapp",
    "state_store",
    "default_branch",
    "object_store.kind",
    "object_store.ipfs_api",
    "object_store.connect_timeout_secs",
    "object_store.max_retries",
    "port_base",
];

impl Config {
    /// Read `<home>/config.toml` if present, then apply the environment.
    pub fn load(home: &Path) -> DgrzResult<Self> {
        Self::load_with(home, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an explicit environment lookup.
    pub fn load_with(home: &Path, env: impl Fn(&str) -> Option<String>) -> DgrzResult<Self> {
        let path = home.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text).map_err(|e| e.with_context("path", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(DgrzError::from(e).with_context("path", path.display())),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> DgrzResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| DgrzError::unexpected_value("malformed configuration").with_source(e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> DgrzResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DgrzError::external("failed to serialize configuration").with_source(e))
    }

    /// Override fields from `DOGG3RZ_GRAPP` and `DOGG3RZ_STATE_STORE`.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> DgrzResult<()> {
        if let Some(grapp) = env(ENV_GRAPP).filter(|g| !g.is_empty()) {
            self.default_grapp = Some(grapp);
        }
        if let Some(store) = env(ENV_STATE_STORE).filter(|s| !s.is_empty()) {
            self.state_store = store.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> DgrzResult<()> {
        dgrz_refs::validate_branch_name(&self.default_branch)?;
        if !(dgrz_fs::MIN_PORT..=dgrz_fs::MAX_PORT).contains(&self.port_base) {
            return Err(DgrzError::out_of_range("port_base outside the user port range")
                .with_context("port_base", self.port_base));
        }
        Ok(())
    }

    /// Write the configuration to `<home>/config.toml` atomically.
    pub fn save(&self, home: &Path) -> DgrzResult<()> {
        std::fs::create_dir_all(home)?;
        let text = self.to_toml()?;
        dgrz_fs::write_atomic_bytes(&home.join(CONFIG_FILE), text.as_bytes())
    }

    pub fn get(&self, key: &str) -> DgrzResult<String> {
        Ok(match key {
            "default_grapp" => self.default_grapp.clone().unwrap_or_default(),
            "state_store" => self.state_store.to_string(),
            "default_branch" => self.default_branch.clone(),
            "object_store.kind" => self.object_store.kind.to_string(),
            "object_store.ipfs_api" => self.object_store.ipfs_api.clone(),
            "object_store.connect_timeout_secs" => self.object_store.connect_timeout_secs.to_string(),
            "object_store.max_retries" => self.object_store.max_retries.to_string(),
            "port_base" => self.port_base.to_string(),
            other => return Err(unknown_key(other)),
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> DgrzResult<()> {
        let mut next = self.clone();
        match key {
            "default_grapp" => {
                next.default_grapp = (!value.is_empty()).then(|| value.to_string());
            }
            "state_store" => next.state_store = value.parse()?,
            "default_branch" => next.default_branch = value.to_string(),
            "object_store.kind" => next.object_store.kind = value.parse()?,
            "object_store.ipfs_api" => next.object_store.ipfs_api = value.to_string(),
            "object_store.connect_timeout_secs" => {
                next.object_store.connect_timeout_secs = parse_number(key, value)?
            }
            "object_store.max_retries" => next.object_store.max_retries = parse_number(key, value)?,
            "port_base" => next.port_base = parse_number(key, value)?,
            other => return Err(unknown_key(other)),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn unknown_key(key: &str) -> DgrzError {
    DgrzError::invalid_value("unknown configuration key").with_context("key", key)
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> DgrzResult<T> {
    value.parse().map_err(|_| {
        DgrzError::invalid_value("expected a non-negative integer")
            .with_context("key", key)
            .with_context("value", value)
    })
}

/// The home directory: `DOGG3RZ_HOME`, else `$HOME/.dogg3rz`.
pub fn resolve_home(env: impl Fn(&str) -> Option<String>) -> DgrzResult<PathBuf> {
    if let Some(home) = env(ENV_HOME).filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    env("HOME")
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".dogg3rz"))
        .ok_or_else(|| DgrzError::not_found(format!("neither {ENV_HOME} nor HOME is set")))
}
