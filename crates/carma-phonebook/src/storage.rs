//! Storage backends for configuration directories

use crate::error::{PhonebookError, Result};
use crate::path::{file_name, normalize_path, parent};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

/// Minimal file tree used for every persisted CARMA file
///
/// All paths are logical and are normalized before use, so `"a/./b"` and
/// `"a/b"` name the same entry. `"."` is the storage root.
pub trait Storage: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool>;

    /// Names of the entries directly under `path`, sorted
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Create `path` and any missing parents
    fn make_dir(&self, path: &str) -> Result<()>;

    /// Remove `path` recursively. A missing path is not an error and a file
    /// path removes the file.
    fn remove_dir(&self, path: &str) -> Result<()>;
}

/// Storage rooted at a directory of the local filesystem
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStorage { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let logical = normalize_path(path)?;
        let real = if logical == "." {
            self.root.clone()
        } else {
            self.root.join(&logical)
        };
        Ok((logical, real))
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        let (_, real) = self.resolve(path)?;
        Ok(real.exists())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let (logical, real) = self.resolve(path)?;
        let entries = std::fs::read_dir(&real).map_err(|e| PhonebookError::io(&logical, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PhonebookError::io(&logical, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let (logical, real) = self.resolve(path)?;
        std::fs::read(&real).map_err(|e| PhonebookError::io(&logical, e))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let (logical, real) = self.resolve(path)?;
        std::fs::write(&real, data).map_err(|e| PhonebookError::io(&logical, e))
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        let (logical, real) = self.resolve(path)?;
        std::fs::create_dir_all(&real).map_err(|e| PhonebookError::io(&logical, e))
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let (logical, real) = self.resolve(path)?;
        let result = match std::fs::symlink_metadata(&real) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&real),
            Ok(_) => std::fs::remove_file(&real),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PhonebookError::io(&logical, e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemNode {
    Dir,
    File(Vec<u8>),
}

/// In-memory storage, used by tests and by staged configurations that are
/// never written to disk
#[derive(Debug)]
pub struct MemStorage {
    nodes: RwLock<BTreeMap<String, MemNode>>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(".".to_string(), MemNode::Dir);
        MemStorage {
            nodes: RwLock::new(nodes),
        }
    }

    /// Snapshot of every file, keyed by normalized path
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.nodes
            .read()
            .iter()
            .filter_map(|(path, node)| match node {
                MemNode::File(data) => Some((path.clone(), data.clone())),
                MemNode::Dir => None,
            })
            .collect()
    }

    fn not_found(path: &str) -> PhonebookError {
        PhonebookError::io(path, io::Error::new(io::ErrorKind::NotFound, "no such entry"))
    }

    fn is_under(candidate: &str, dir: &str) -> bool {
        dir == "." || candidate.starts_with(&format!("{}/", dir))
    }
}

impl Storage for MemStorage {
    fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize_path(path)?;
        Ok(self.nodes.read().contains_key(&path))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize_path(path)?;
        let nodes = self.nodes.read();
        match nodes.get(&path) {
            Some(MemNode::Dir) => {}
            Some(MemNode::File(_)) => {
                return Err(PhonebookError::io(
                    &path,
                    io::Error::new(io::ErrorKind::Other, "not a directory"),
                ))
            }
            None => return Err(Self::not_found(&path)),
        }
        Ok(nodes
            .keys()
            .filter(|candidate| candidate.as_str() != "." && parent(candidate) == path)
            .map(|candidate| file_name(candidate).to_string())
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        match self.nodes.read().get(&path) {
            Some(MemNode::File(data)) => Ok(data.clone()),
            Some(MemNode::Dir) => Err(PhonebookError::io(
                &path,
                io::Error::new(io::ErrorKind::Other, "is a directory"),
            )),
            None => Err(Self::not_found(&path)),
        }
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = normalize_path(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(parent(&path)) {
            Some(MemNode::Dir) => {}
            _ => return Err(Self::not_found(parent(&path))),
        }
        if let Some(MemNode::Dir) = nodes.get(&path) {
            return Err(PhonebookError::io(
                &path,
                io::Error::new(io::ErrorKind::Other, "is a directory"),
            ));
        }
        nodes.insert(path, MemNode::File(data.to_vec()));
        Ok(())
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let mut nodes = self.nodes.write();
        let mut current = String::new();
        for part in path.split('/') {
            if part == "." {
                continue;
            }
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            match nodes.get(&current) {
                Some(MemNode::Dir) => {}
                Some(MemNode::File(_)) => {
                    return Err(PhonebookError::io(
                        &current,
                        io::Error::new(io::ErrorKind::AlreadyExists, "a file is in the way"),
                    ))
                }
                None => {
                    nodes.insert(current.clone(), MemNode::Dir);
                }
            }
        }
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let mut nodes = self.nodes.write();
        nodes.retain(|candidate, _| candidate != &path && !Self::is_under(candidate, &path));
        if path == "." {
            nodes.insert(".".to_string(), MemNode::Dir);
        }
        Ok(())
    }
}
