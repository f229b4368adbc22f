//! Process settings for `carmanode`, read from a YAML file
//!
//! These are local knobs of the running process. The network configuration
//! itself lives in the CARMA config directory named by `config_dir`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NodeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Root of the CARMA configuration (global.json, local.json, phonebook/)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Write the phonebook as one packed file instead of one file per peer
    #[serde(default)]
    pub pack_on_flush: bool,

    /// Upper bound on phonebook entries held in memory once persisted
    #[serde(default)]
    pub max_resident_records: Option<usize>,

    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("carma")
}

fn default_maintenance_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            maintenance_interval_secs: default_maintenance_interval(),
            pack_on_flush: false,
            max_resident_records: None,
            log_level: default_log_level(),
        }
    }
}

impl NodeSettings {
    /// Load settings from `path`, or the defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| NodeError::SettingsIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| NodeError::Settings {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings = NodeSettings::from_yaml("pack_on_flush: true\n").unwrap();
        assert!(settings.pack_on_flush);
        assert_eq!(settings.maintenance_interval_secs, 60);
        assert_eq!(settings.config_dir, PathBuf::from("carma"));
        assert_eq!(settings.max_resident_records, None);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_full_file() {
        let yaml = "config_dir: /var/lib/carma\n\
                    maintenance_interval_secs: 5\n\
                    max_resident_records: 128\n\
                    log_level: debug\n";
        let settings = NodeSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.config_dir, PathBuf::from("/var/lib/carma"));
        assert_eq!(settings.maintenance_interval_secs, 5);
        assert_eq!(settings.max_resident_records, Some(128));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = NodeSettings::load(&dir.path().join("carmanode.yaml")).unwrap();
        assert_eq!(settings, NodeSettings::default());
    }

    #[test]
    fn test_load_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carmanode.yaml");
        fs::write(&path, "maintenance_interval_secs: [nope]\n").unwrap();
        let err = NodeSettings::load(&path).unwrap_err();
        assert!(matches!(err, NodeError::Settings { .. }));
    }
}
