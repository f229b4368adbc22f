//! Crash-safe versioned files
//!
//! A logical file at `path` is a directory of version directories named
//! `<unix_secs>.<seq>`. Each version holds a `data` file and, once `data`
//! is fully written, an empty `done` marker. A version without both is the
//! remnant of an interrupted write and is discarded by the next reader.

use crate::error::{PhonebookError, Result};
use crate::path::{join, normalize_path};
use crate::storage::Storage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

const DATA: &str = "data";
const DONE: &str = "done";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version {
    secs: u64,
    seq: u64,
}

impl Version {
    fn parse(name: &str) -> Option<Self> {
        let (secs, seq) = name.split_once('.')?;
        Some(Version {
            secs: secs.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }

    fn now() -> Self {
        let secs = chrono::Utc::now().timestamp().max(0) as u64;
        Version { secs, seq: 1 }
    }

    fn successor(self) -> Self {
        Version {
            secs: self.secs,
            seq: self.seq + 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.secs, self.seq)
    }
}

/// Versions under `path`, oldest first. Names that are not versions are
/// left alone.
fn list_versions(storage: &dyn Storage, path: &str) -> Result<Vec<Version>> {
    let mut versions: Vec<Version> = storage
        .list_dir(path)?
        .iter()
        .filter_map(|name| Version::parse(name))
        .collect();
    versions.sort();
    Ok(versions)
}

fn version_dir(path: &str, version: Version) -> Result<String> {
    join(path, &version.to_string())
}

/// Find the newest complete version, dropping incomplete newer versions and
/// every older version on the way.
fn settle(storage: &dyn Storage, path: &str) -> Result<Option<(Version, String)>> {
    let mut newest = None;
    for version in list_versions(storage, path)?.into_iter().rev() {
        let dir = version_dir(path, version)?;
        if newest.is_some() {
            debug!("Removing superseded version {}", dir);
            storage.remove_dir(&dir)?;
            continue;
        }
        if storage.exists(&join(&dir, DATA)?)? && storage.exists(&join(&dir, DONE)?)? {
            newest = Some((version, dir));
        } else {
            debug!("Removing incomplete version {}", dir);
            storage.remove_dir(&dir)?;
        }
    }
    Ok(newest)
}

/// Read the newest complete version of the file at `path`
///
/// Returns `None` when the file does not exist or no version survived.
pub fn read_atomic_file(storage: &dyn Storage, path: &str) -> Result<Option<Vec<u8>>> {
    let path = normalize_path(path)?;
    if !storage.exists(&path)? {
        return Ok(None);
    }
    match settle(storage, &path)? {
        Some((_, dir)) => Ok(Some(storage.read_file(&join(&dir, DATA)?)?)),
        None => Ok(None),
    }
}

/// Write a new version of the file at `path`
///
/// When the newest complete version already holds `data` nothing new is
/// written, so repeated writes of the same content leave the tree as is.
pub fn write_atomic_file(storage: &dyn Storage, path: &str, data: &[u8]) -> Result<()> {
    let path = normalize_path(path)?;
    storage.make_dir(&path)?;

    if let Some((_, dir)) = settle(storage, &path)? {
        if storage.read_file(&join(&dir, DATA)?)? == data {
            return Ok(());
        }
    }

    let previous = list_versions(storage, &path)?;
    let now = Version::now();
    let next = match previous.last() {
        Some(newest) if *newest >= now => newest.successor(),
        _ => now,
    };

    let dir = version_dir(&path, next)?;
    storage.make_dir(&dir)?;
    storage.write_file(&join(&dir, DATA)?, data)?;
    storage.write_file(&join(&dir, DONE)?, &[])?;

    for version in previous {
        storage.remove_dir(&version_dir(&path, version)?)?;
    }
    Ok(())
}

pub fn delete_atomic_file(storage: &dyn Storage, path: &str) -> Result<()> {
    storage.remove_dir(path)
}

pub fn read_atomic_json<T: DeserializeOwned>(storage: &dyn Storage, path: &str) -> Result<Option<T>> {
    match read_atomic_file(storage, path)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PhonebookError::json(path, e)),
        None => Ok(None),
    }
}

/// Write `value` as two-space pretty-printed JSON
pub fn write_atomic_json<T: Serialize>(storage: &dyn Storage, path: &str, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| PhonebookError::json(path, e))?;
    bytes.push(b'\n');
    write_atomic_file(storage, path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;

    #[test]
    fn test_missing_file_reads_as_none() {
        let storage = MemStorage::new();
        assert_eq!(read_atomic_file(&storage, "nothing").unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemStorage::new();
        write_atomic_file(&storage, "cfg/global.json", b"one").unwrap();
        write_atomic_file(&storage, "cfg/global.json", b"two").unwrap();
        assert_eq!(read_atomic_file(&storage, "cfg/global.json").unwrap().unwrap(), b"two");
        assert_eq!(list_versions(&storage, "cfg/global.json").unwrap().len(), 1);
    }

    #[test]
    fn test_version_numbers_increase() {
        let storage = MemStorage::new();
        storage.make_dir("f/99999999999.7").unwrap();
        storage.write_file("f/99999999999.7/data", b"future").unwrap();
        storage.write_file("f/99999999999.7/done", b"").unwrap();

        write_atomic_file(&storage, "f", b"next").unwrap();
        let versions = list_versions(&storage, "f").unwrap();
        assert_eq!(versions, vec![Version { secs: 99999999999, seq: 8 }]);
    }

    #[test]
    fn test_identical_write_is_skipped() {
        let storage = MemStorage::new();
        write_atomic_file(&storage, "f", b"same").unwrap();
        let before = storage.files();
        write_atomic_file(&storage, "f", b"same").unwrap();
        assert_eq!(storage.files(), before);
    }

    #[test]
    fn test_reader_discards_incomplete_versions() {
        let storage = MemStorage::new();
        write_atomic_file(&storage, "f", b"good").unwrap();
        storage.make_dir("f/99999999999.1").unwrap();
        storage.write_file("f/99999999999.1/data", b"half").unwrap();

        assert_eq!(read_atomic_file(&storage, "f").unwrap().unwrap(), b"good");
        assert!(!storage.exists("f/99999999999.1").unwrap());
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        assert!(Version::parse("10.1").unwrap() > Version::parse("9.5").unwrap());
        assert!(Version::parse("10.10").unwrap() > Version::parse("10.9").unwrap());
        assert_eq!(Version::parse("x.1"), None);
        assert_eq!(Version::parse("12"), None);
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemStorage::new();
        write_atomic_json(&storage, "j", &vec![1, 2, 3]).unwrap();
        let value: Option<Vec<u32>> = read_atomic_json(&storage, "j").unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        let raw = read_atomic_file(&storage, "j").unwrap().unwrap();
        assert!(String::from_utf8(raw).unwrap().starts_with("[\n  1,"));

        delete_atomic_file(&storage, "j").unwrap();
        let gone: Option<Vec<u32>> = read_atomic_json(&storage, "j").unwrap();
        assert_eq!(gone, None);
    }
}
