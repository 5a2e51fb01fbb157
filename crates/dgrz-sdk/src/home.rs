use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dgrz_fs::layout;
use dgrz_refs::FileRefStore;
use dgrz_store::{InMemoryObjectStore, IpfsHttpStore, LocalObjectStore, ObjectStore};
use dgrz_types::{DgrzError, DgrzResult, WorkspacePath};
use tracing::info;

use crate::config::{resolve_home, Config, ObjectStoreKind};
use crate::grapplication::Grapplication;

/// The dogg3rz home directory: configuration plus all grapplications.
#[derive(Debug, Clone)]
pub struct Home {
    root: PathBuf,
    config: Config,
}

impl Home {
    /// Open the home at `root`, loading its configuration.
    pub fn open(root: impl Into<PathBuf>) -> DgrzResult<Self> {
        let root = root.into();
        let config = Config::load(&root)?;
        Ok(Self { root, config })
    }

    /// Open the home named by `DOGG3RZ_HOME` (or `$HOME/.dogg3rz`).
    pub fn from_env() -> DgrzResult<Self> {
        Self::open(resolve_home(|key| std::env::var(key).ok())?)
    }

    /// Open with an explicit configuration, ignoring `config.toml`.
    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> DgrzResult<Self> {
        config.validate()?;
        Ok(Self {
            root: root.into(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save_config(&self) -> DgrzResult<()> {
        self.config.save(&self.root)
    }

    pub fn grapplications_dir(&self) -> PathBuf {
        self.root.join(layout::GRAPPLICATIONS_DIR)
    }

    /// Create a grapplication: its working tree, metadata directory, and
    /// `HEAD`. Fails with `AlreadyExists` if the name is taken.
    pub fn init_grapplication(&self, name: &str) -> DgrzResult<Grapplication> {
        validate_grapp_name(name)?;
        let parent = self.grapplications_dir();
        fs::create_dir_all(&parent)?;
        let root = parent.join(name);

        dgrz_fs::directory_lock(&parent, || {
            if root.exists() {
                return Err(DgrzError::already_exists("grapplication already exists").with_context("grapp", name));
            }
            fs::create_dir_all(layout::metadata_dir(&root))?;
            FileRefStore::new(&root).init(&self.config.default_branch)?;
            Ok(())
        })?;
        info!(grapp = name, "grapplication initialized");
        self.grapplication(Some(name))
    }

    /// Open `name`, or the configured default grapplication.
    pub fn grapplication(&self, name: Option<&str>) -> DgrzResult<Grapplication> {
        let name = match name.or(self.config.default_grapp.as_deref()) {
            Some(name) => name,
            None => return Err(DgrzError::not_found("no grapplication given and no default configured")),
        };
        validate_grapp_name(name)?;
        let root = self.grapplications_dir().join(name);
        if !layout::metadata_dir(&root).is_dir() {
            return Err(DgrzError::not_found("grapplication does not exist").with_context("grapp", name));
        }
        let store = open_store(&self.config, &root)?;
        Ok(Grapplication::new(name, root, store, self.config.port_base))
    }

    /// Names of all initialized grapplications, sorted.
    pub fn list_grapplications(&self) -> DgrzResult<Vec<String>> {
        let dir = self.grapplications_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_grapp_name(&name).is_ok() && layout::metadata_dir(&entry.path()).is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A grapplication name is a single path element.
fn validate_grapp_name(name: &str) -> DgrzResult<()> {
    let path = WorkspacePath::parse(name)?;
    if path.element_count() != 1 || path.ends_with_separator() {
        return Err(DgrzError::invalid_value("grapplication name must be a single path element")
            .with_context("grapp", name));
    }
    Ok(())
}

/// Build the object store the configuration selects for `grapp_root`.
pub fn open_store(config: &Config, grapp_root: &Path) -> DgrzResult<Arc<dyn ObjectStore>> {
    Ok(match config.object_store.kind {
        ObjectStoreKind::Memory => Arc::new(InMemoryObjectStore::new()),
        ObjectStoreKind::Local => Arc::new(LocalObjectStore::open(layout::objects_dir(grapp_root))?),
        ObjectStoreKind::Ipfs => Arc::new(IpfsHttpStore::new(config.object_store.ipfs())?),
    })
}
