//! On-disk CARMA configuration of one node
//!
//! A configuration directory holds three atomic JSON files and the
//! phonebook:
//!
//! ```text
//! <dir>/bootstrap.json   present only in a staged bootstrap configuration
//! <dir>/global.json
//! <dir>/local.json
//! <dir>/phonebook/
//! ```

use carma_phonebook::path::join;
use carma_phonebook::{
    delete_atomic_file, normalize_path, read_atomic_json, write_atomic_json, GlobalConfig,
    LocalConfig, LocalJson, PhonebookError, Phonebook, Storage,
};
use carma_protocol::{ChannelId, LinkAddress, Psn};
use carma_routing::Topology;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{NodeError, Result};

const BOOTSTRAP_FILE: &str = "bootstrap.json";
const GLOBAL_FILE: &str = "global.json";
const LOCAL_FILE: &str = "local.json";
const PHONEBOOK_DIR: &str = "phonebook";

/// Who staged a bootstrap configuration and how the new node reaches them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapRecord {
    pub bootstrapper: Psn,
    pub channel_id: ChannelId,
    pub link_address: LinkAddress,
}

pub struct Config {
    storage: Arc<dyn Storage>,
    dir: String,
    pub global: GlobalConfig,
    pub local: LocalConfig,
    pub bootstrap: Option<BootstrapRecord>,
    phonebook: Phonebook,
}

impl Config {
    /// A configuration at `dir` with an empty phonebook. Nothing is written
    /// until [`Config::flush`].
    pub fn new(
        storage: Arc<dyn Storage>,
        dir: &str,
        global: GlobalConfig,
        local: LocalConfig,
    ) -> Result<Self> {
        let dir = normalize_path(dir)?;
        let phonebook = Phonebook::new(storage.clone(), &join(&dir, PHONEBOOK_DIR)?)?;
        Ok(Self {
            storage,
            dir,
            global,
            local,
            bootstrap: None,
            phonebook,
        })
    }

    pub fn load(storage: Arc<dyn Storage>, dir: &str) -> Result<Self> {
        let dir = normalize_path(dir)?;

        let global_path = join(&dir, GLOBAL_FILE)?;
        let global: GlobalConfig = read_atomic_json(&*storage, &global_path)?
            .ok_or_else(|| NodeError::MissingFile(global_path.clone()))?;
        global.validate()?;

        let local_path = join(&dir, LOCAL_FILE)?;
        let local: LocalJson = read_atomic_json(&*storage, &local_path)?
            .ok_or_else(|| NodeError::MissingFile(local_path.clone()))?;
        let local = LocalConfig::from_json(local)?;

        let bootstrap = read_atomic_json(&*storage, &join(&dir, BOOTSTRAP_FILE)?)?;
        let phonebook = Phonebook::load(storage.clone(), &join(&dir, PHONEBOOK_DIR)?)?;

        let config = Self {
            storage,
            dir,
            global,
            local,
            bootstrap,
            phonebook,
        };
        if config.bootstrap.is_some() {
            config.clear_deducible();
        }
        info!(
            "Loaded configuration {} for {} ({}, {} peers)",
            config.dir,
            config.local.psn(),
            config.local.role(),
            config.phonebook.len()
        );
        Ok(config)
    }

    /// Bound the number of persisted phonebook entries kept in memory
    pub fn with_max_resident(mut self, max_resident: usize) -> Self {
        self.phonebook = self.phonebook.with_max_resident(max_resident);
        self
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn phonebook(&self) -> &Phonebook {
        &self.phonebook
    }

    pub fn topology(&self) -> Topology<'_> {
        Topology::new(&self.phonebook, &self.global, &self.local)
    }

    /// Drop every value that can be recomputed from the phonebook
    pub fn clear_deducible(&self) {
        self.phonebook.clear_deducible();
        self.local.clear_deducible();
        debug!("Cleared deducible state of {}", self.dir);
    }

    /// Write the configuration to disk. Unchanged files are left untouched,
    /// so repeated flushes are cheap.
    pub fn flush(&self, pack: bool) -> Result<()> {
        let storage = &*self.storage;
        let bootstrap_path = join(&self.dir, BOOTSTRAP_FILE)?;
        match &self.bootstrap {
            Some(bootstrap) => write_atomic_json(storage, &bootstrap_path, bootstrap)?,
            None => delete_atomic_file(storage, &bootstrap_path)?,
        }
        write_atomic_json(storage, &join(&self.dir, GLOBAL_FILE)?, &self.global)?;
        write_atomic_json(storage, &join(&self.dir, LOCAL_FILE)?, &self.local.to_json())?;
        self.phonebook.flush(pack)?;
        debug!("Flushed configuration {} (pack: {})", self.dir, pack);
        Ok(())
    }

    /// Stage a configuration at `dir` for a node that will join through
    /// this one. The staged copy carries the full phonebook and a
    /// placeholder identity; this configuration is not modified.
    pub fn prepare_to_bootstrap(
        &self,
        dir: &str,
        channel_id: ChannelId,
        link_address: LinkAddress,
    ) -> Result<Config> {
        if normalize_path(dir)? == self.dir {
            return Err(PhonebookError::Config(format!(
                "Bootstrap configuration cannot overwrite the current configuration {}",
                self.dir
            ))
            .into());
        }

        let mut staged = Config::new(
            self.storage.clone(),
            dir,
            self.global.clone(),
            self.local.placeholder(),
        )?;
        staged.bootstrap = Some(BootstrapRecord {
            bootstrapper: self.local.psn().clone(),
            channel_id,
            link_address,
        });
        staged.phonebook.copy_from(&self.phonebook)?;
        staged.clear_deducible();
        staged.flush(false)?;

        info!(
            "Staged bootstrap configuration {} ({} peers)",
            staged.dir,
            staged.phonebook.len()
        );
        Ok(staged)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dir", &self.dir)
            .field("psn", self.local.psn())
            .field("role", &self.local.role())
            .field("bootstrap", &self.bootstrap)
            .field("peers", &self.phonebook.len())
            .finish()
    }
}
