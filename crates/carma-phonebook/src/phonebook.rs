//! The peer directory
//!
//! Entries live under `<dir>/unpacked/<slug>` (one atomic JSON file per
//! entry) or all together in `<dir>/packed/entries`. Unpacked files take
//! precedence over packed entries. PSNs found in the unpacked directory are
//! registered without reading their files; a body is read on first use.
//!
//! Resident bodies can be bounded with [`Phonebook::with_max_resident`].
//! Only bodies whose unpacked file is known to be current are evicted, so
//! an evicted entry can always be read back from disk. Entries that exist
//! only in memory are never evicted.

use crate::atomic::{read_atomic_json, write_atomic_json};
use crate::error::{PhonebookError, Result};
use crate::global::GlobalConfig;
use crate::local::LocalConfig;
use crate::path::{join, normalize_path};
use crate::record::{PeerRecord, PeerRef, RecordJson};
use crate::slug::{slugify, unslugify};
use crate::storage::Storage;
use carma_crypto::psn_hash;
use carma_protocol::{Psn, PsnHash, Role};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNPACKED_DIR: &str = "unpacked";
const PACKED_DIR: &str = "packed";
const PACKED_FILE: &str = "entries";

#[derive(Clone)]
enum Slot {
    Loaded {
        record: Arc<PeerRecord>,
        /// The unpacked file holds exactly this record
        persisted: bool,
    },
    OnDisk,
}

#[derive(Default)]
struct Index {
    slots: BTreeMap<Psn, Slot>,
    by_hash: HashMap<PsnHash, Psn>,
}

impl Index {
    fn insert(&mut self, psn: Psn, slot: Slot) -> Result<()> {
        if psn.as_str().is_empty() {
            return Err(PhonebookError::Config("empty PSN".to_string()));
        }
        if self.slots.contains_key(&psn) {
            return Err(PhonebookError::DuplicateEntry(psn.to_string()));
        }
        let hash = psn_hash(&psn);
        if let Some(other) = self.by_hash.get(&hash) {
            return Err(PhonebookError::DuplicateEntry(format!(
                "{} and {} share the directory hash {}",
                other, psn, hash
            )));
        }
        self.by_hash.insert(hash, psn.clone());
        self.slots.insert(psn, slot);
        Ok(())
    }

    fn loaded(&self) -> Vec<Arc<PeerRecord>> {
        self.slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Loaded { record, .. } => Some(record.clone()),
                Slot::OnDisk => None,
            })
            .collect()
    }

    fn resident(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Loaded { .. }))
            .count()
    }
}

pub struct Phonebook {
    storage: Arc<dyn Storage>,
    dir: String,
    index: RwLock<Index>,
    /// Evictable PSNs, least recently used first
    recent: Mutex<LruCache<Psn, ()>>,
    max_resident: Option<usize>,
    mutation: Mutex<()>,
}

impl fmt::Debug for Phonebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phonebook")
            .field("dir", &self.dir)
            .field("len", &self.len())
            .field("max_resident", &self.max_resident)
            .finish()
    }
}

impl Phonebook {
    /// Create an empty phonebook rooted at `dir`. Nothing is read or written.
    pub fn new(storage: Arc<dyn Storage>, dir: &str) -> Result<Self> {
        Ok(Phonebook {
            storage,
            dir: normalize_path(dir)?,
            index: RwLock::new(Index::default()),
            recent: Mutex::new(LruCache::unbounded()),
            max_resident: None,
            mutation: Mutex::new(()),
        })
    }

    /// Open the phonebook stored under `dir`
    pub fn load(storage: Arc<dyn Storage>, dir: &str) -> Result<Self> {
        let phonebook = Phonebook::new(storage, dir)?;
        let storage = phonebook.storage.clone();
        let mut index = Index::default();

        let packed_file = phonebook.packed_file()?;
        let packed: Option<BTreeMap<String, RecordJson>> = read_atomic_json(&*storage, &packed_file)?;
        if let Some(entries) = packed {
            let mut imported = 0usize;
            for (slug, json) in entries {
                let psn = Psn::new(unslugify(&slug));
                if slugify(psn.as_str()) != slug {
                    warn!("Ignoring packed entry with malformed name {:?}", slug);
                    continue;
                }
                if storage.exists(&phonebook.file_for(&psn)?)? {
                    continue;
                }
                let record = PeerRecord::from_json(json)?;
                if record.psn != psn {
                    return Err(PhonebookError::corrupt(
                        packed_file.clone(),
                        format!("entry {:?} holds PSN {}", slug, record.psn),
                    ));
                }
                index.insert(
                    psn,
                    Slot::Loaded {
                        record: Arc::new(record),
                        persisted: false,
                    },
                )?;
                imported += 1;
            }
            if imported == 0 {
                debug!("Packed phonebook is fully subsumed, removing it");
                storage.remove_dir(&phonebook.packed_dir()?)?;
            }
        }

        let unpacked_dir = phonebook.unpacked_dir()?;
        if storage.exists(&unpacked_dir)? {
            for slug in storage.list_dir(&unpacked_dir)? {
                let psn = Psn::new(unslugify(&slug));
                if slugify(psn.as_str()) != slug {
                    warn!("Ignoring unpacked entry with malformed name {:?}", slug);
                    continue;
                }
                index.insert(psn, Slot::OnDisk)?;
            }
        }

        info!(
            "Loaded phonebook from {} ({} entries, {} resident)",
            phonebook.dir,
            index.slots.len(),
            index.resident()
        );
        *phonebook.index.write() = index;
        Ok(phonebook)
    }

    /// Bound the number of resident entry bodies
    pub fn with_max_resident(mut self, max_resident: usize) -> Self {
        self.max_resident = Some(max_resident);
        self
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn unpacked_dir(&self) -> Result<String> {
        join(&self.dir, UNPACKED_DIR)
    }

    fn packed_dir(&self) -> Result<String> {
        join(&self.dir, PACKED_DIR)
    }

    fn packed_file(&self) -> Result<String> {
        join(&self.packed_dir()?, PACKED_FILE)
    }

    fn file_for(&self, psn: &Psn) -> Result<String> {
        join(&self.unpacked_dir()?, &slugify(psn.as_str()))
    }

    pub fn len(&self) -> usize {
        self.index.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries whose body is in memory
    pub fn resident(&self) -> usize {
        self.index.read().resident()
    }

    /// Snapshot of every reference, in PSN order
    pub fn refs(&self) -> Vec<PeerRef> {
        self.index.read().slots.keys().map(PeerRef::from).collect()
    }

    pub fn find(&self, psn: &Psn) -> Option<PeerRef> {
        self.index
            .read()
            .slots
            .contains_key(psn)
            .then(|| PeerRef::from(psn))
    }

    pub fn find_hash(&self, hash: &PsnHash) -> Option<PeerRef> {
        self.index.read().by_hash.get(hash).map(PeerRef::from)
    }

    pub fn expect(&self, psn: &Psn) -> Result<PeerRef> {
        self.find(psn)
            .ok_or_else(|| PhonebookError::NotFound(psn.to_string()))
    }

    pub fn expect_hash(&self, hash: &PsnHash) -> Result<PeerRef> {
        self.find_hash(hash)
            .ok_or_else(|| PhonebookError::NotFound(format!("hash {}", hash)))
    }

    /// Resolve a reference, reading the entry from disk if needed
    pub fn at(&self, peer: &PeerRef) -> Result<Arc<PeerRecord>> {
        let psn = peer.psn();
        let slot = self.index.read().slots.get(psn).cloned();
        match slot {
            None => Err(PhonebookError::StaleReference(psn.to_string())),
            Some(Slot::Loaded { record, persisted }) => {
                if persisted {
                    self.recent.lock().promote(psn);
                }
                Ok(record)
            }
            Some(Slot::OnDisk) => {
                let record = self.load_body(psn)?;
                // A caller may be holding a derived-set lock that a
                // mutation is waiting on, so never block here.
                if let Some(_guard) = self.mutation.try_lock() {
                    self.evict_locked();
                }
                Ok(record)
            }
        }
    }

    pub fn get(&self, psn: &Psn) -> Result<Arc<PeerRecord>> {
        self.at(&self.expect(psn)?)
    }

    /// Every entry, in PSN order
    pub fn records(&self) -> Result<Vec<Arc<PeerRecord>>> {
        self.refs().iter().map(|peer| self.at(peer)).collect()
    }

    fn load_body(&self, psn: &Psn) -> Result<Arc<PeerRecord>> {
        let path = self.file_for(psn)?;
        let json: Option<RecordJson> = read_atomic_json(&*self.storage, &path)?;
        let json = json.ok_or_else(|| {
            PhonebookError::StaleReference(format!("{} (no file at {})", psn, path))
        })?;
        let record = PeerRecord::from_json(json)?;
        if &record.psn != psn {
            return Err(PhonebookError::corrupt(
                path,
                format!("file holds PSN {}", record.psn),
            ));
        }
        let record = Arc::new(record);

        {
            let mut index = self.index.write();
            match index.slots.get_mut(psn) {
                None => return Err(PhonebookError::StaleReference(psn.to_string())),
                Some(Slot::Loaded { record: existing, .. }) => return Ok(existing.clone()),
                Some(slot) => {
                    *slot = Slot::Loaded {
                        record: record.clone(),
                        persisted: true,
                    }
                }
            }
        }
        debug!("Read phonebook entry {} from {}", psn, path);
        self.recent.lock().put(psn.clone(), ());
        Ok(record)
    }

    fn evict_locked(&self) {
        let Some(max) = self.max_resident else {
            return;
        };
        let mut resident = self.index.read().resident();
        while resident > max {
            let Some((psn, ())) = self.recent.lock().pop_lru() else {
                break;
            };
            let mut index = self.index.write();
            if let Some(slot) = index.slots.get_mut(&psn) {
                if matches!(slot, Slot::Loaded { persisted: true, .. }) {
                    *slot = Slot::OnDisk;
                    resident -= 1;
                    debug!("Evicted phonebook entry {}", psn);
                }
            }
        }
    }

    /// Insert an entry without touching any derived value
    pub fn add_fast(&self, record: PeerRecord) -> Result<PeerRef> {
        let _guard = self.mutation.lock();
        self.insert_locked(record)
    }

    fn insert_locked(&self, record: PeerRecord) -> Result<PeerRef> {
        let peer = record.peer_ref();
        self.index.write().insert(
            record.psn.clone(),
            Slot::Loaded {
                record: Arc::new(record),
                persisted: false,
            },
        )?;
        Ok(peer)
    }

    /// Insert an entry and drop every derived value its arrival changes
    pub fn add_slow(
        &self,
        record: PeerRecord,
        global: &GlobalConfig,
        local: &LocalConfig,
    ) -> Result<PeerRef> {
        let _guard = self.mutation.lock();
        if self.index.read().slots.contains_key(&record.psn) {
            return Err(PhonebookError::DuplicateEntry(record.psn.to_string()));
        }
        let loaded = self.index.read().loaded();

        if record.role.has_bucket() {
            let bucket = global.bucket_of(&record.psn)?;
            record.caches().bucket.set(bucket);
            for existing in loaded.iter().filter(|r| r.role.has_bucket()) {
                let theirs = existing
                    .caches()
                    .bucket
                    .get_or_try_publish(|| global.bucket_of(&existing.psn))?;
                if *theirs == bucket {
                    existing.caches().clear_buckets();
                }
            }
            if local.role().has_bucket() {
                let ours = local
                    .record
                    .caches()
                    .bucket
                    .get_or_try_publish(|| global.bucket_of(local.psn()))?;
                if *ours == bucket {
                    local.record.caches().clear_buckets();
                }
            }
        }

        if global.rigid && record.role == Role::McLeader {
            for existing in loaded.iter().filter(|r| r.role == Role::MbServer) {
                existing.caches().mc_leaders.clear();
            }
            if local.role() == Role::MbServer {
                local.record.caches().mc_leaders.clear();
            }
        }

        local.clear_derived();
        let peer = self.insert_locked(record)?;
        self.evict_locked();
        Ok(peer)
    }

    /// Drop an entry. Its unpacked file is deleted by the next flush.
    pub fn remove(&self, peer: &PeerRef) -> Result<()> {
        let _guard = self.mutation.lock();
        {
            let mut index = self.index.write();
            if index.slots.remove(peer.psn()).is_none() {
                return Err(PhonebookError::StaleReference(peer.to_string()));
            }
            index.by_hash.remove(&psn_hash(peer.psn()));
        }
        self.recent.lock().pop(peer.psn());
        Ok(())
    }

    pub fn clear(&self) {
        let _guard = self.mutation.lock();
        *self.index.write() = Index::default();
        self.recent.lock().clear();
    }

    /// Replace the contents of this phonebook with a copy of `other`
    pub fn copy_from(&self, other: &Phonebook) -> Result<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        let records = other.records()?;
        let _guard = self.mutation.lock();
        let mut index = Index::default();
        for record in records {
            index.insert(
                record.psn.clone(),
                Slot::Loaded {
                    record: Arc::new(PeerRecord::clone(&record)),
                    persisted: false,
                },
            )?;
        }
        *self.index.write() = index;
        self.recent.lock().clear();
        Ok(())
    }

    /// Drop every derived value cached on resident entries
    pub fn clear_deducible(&self) {
        for record in self.index.read().loaded() {
            record.clear_deducible();
        }
    }

    /// Write the directory out, either one file per entry or as a single
    /// packed file
    pub fn flush(&self, pack: bool) -> Result<()> {
        let _guard = self.mutation.lock();
        if pack {
            self.flush_packed()?;
        } else {
            self.flush_unpacked()?;
        }
        info!("Flushed phonebook {} ({} entries, packed: {})", self.dir, self.len(), pack);
        Ok(())
    }

    fn flush_packed(&self) -> Result<()> {
        let on_disk: Vec<Psn> = self
            .index
            .read()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::OnDisk))
            .map(|(psn, _)| psn.clone())
            .collect();
        for psn in &on_disk {
            self.load_body(psn)?;
        }

        let entries: BTreeMap<String, RecordJson> = self
            .index
            .read()
            .loaded()
            .iter()
            .map(|record| (slugify(record.psn.as_str()), record.to_json()))
            .collect();
        write_atomic_json(&*self.storage, &self.packed_file()?, &entries)?;
        self.storage.remove_dir(&self.unpacked_dir()?)?;

        for slot in self.index.write().slots.values_mut() {
            if let Slot::Loaded { persisted, .. } = slot {
                *persisted = false;
            }
        }
        self.recent.lock().clear();
        Ok(())
    }

    fn flush_unpacked(&self) -> Result<()> {
        let pending: Vec<Arc<PeerRecord>> = self
            .index
            .read()
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Loaded {
                    record,
                    persisted: false,
                } => Some(record.clone()),
                _ => None,
            })
            .collect();
        for record in &pending {
            write_atomic_json(&*self.storage, &self.file_for(&record.psn)?, &record.to_json())?;
        }

        let unpacked_dir = self.unpacked_dir()?;
        if self.storage.exists(&unpacked_dir)? {
            for slug in self.storage.list_dir(&unpacked_dir)? {
                let psn = Psn::new(unslugify(&slug));
                let known = slugify(psn.as_str()) == slug
                    && self.index.read().slots.contains_key(&psn);
                if !known {
                    debug!("Removing dangling phonebook file {}", slug);
                    self.storage.remove_dir(&join(&unpacked_dir, &slug)?)?;
                }
            }
        }
        self.storage.remove_dir(&self.packed_dir()?)?;

        {
            let mut index = self.index.write();
            for record in &pending {
                if let Some(Slot::Loaded { record: current, persisted }) =
                    index.slots.get_mut(&record.psn)
                {
                    if Arc::ptr_eq(current, record) {
                        *persisted = true;
                    }
                }
            }
        }
        {
            let mut recent = self.recent.lock();
            for record in &pending {
                recent.put(record.psn.clone(), ());
            }
        }
        self.evict_locked();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use carma_crypto::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};

    fn record(psn: &str, role: Role) -> PeerRecord {
        PeerRecord::new(Psn::from(psn), role, vec![1; PUBLIC_KEY_SIZE])
    }

    fn phonebook() -> (Arc<MemStorage>, Phonebook) {
        let storage = Arc::new(MemStorage::new());
        let phonebook = Phonebook::new(storage.clone(), "cfg/phonebook").unwrap();
        (storage, phonebook)
    }

    #[test]
    fn test_add_and_find() {
        let (_, pb) = phonebook();
        let peer = pb.add_fast(record("alice", Role::Client)).unwrap();
        assert_eq!(pb.find(&Psn::from("alice")), Some(peer.clone()));
        assert_eq!(pb.find_hash(&psn_hash(&Psn::from("alice"))), Some(peer.clone()));
        assert_eq!(pb.at(&peer).unwrap().role, Role::Client);
        assert!(pb.find(&Psn::from("bob")).is_none());
        assert_eq!(
            pb.expect(&Psn::from("bob")).unwrap_err().kind(),
            carma_protocol::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_duplicate_psn_is_config_error() {
        let (_, pb) = phonebook();
        pb.add_fast(record("alice", Role::Client)).unwrap();
        let err = pb.add_fast(record("alice", Role::MbServer)).unwrap_err();
        assert!(matches!(err, PhonebookError::DuplicateEntry(_)));
        assert_eq!(err.kind(), carma_protocol::ErrorKind::ConfigInvariantViolation);
        assert_eq!(pb.len(), 1);
    }

    #[test]
    fn test_removed_reference_is_stale() {
        let (_, pb) = phonebook();
        let peer = pb.add_fast(record("alice", Role::Client)).unwrap();
        pb.remove(&peer).unwrap();
        assert!(matches!(pb.at(&peer), Err(PhonebookError::StaleReference(_))));
        assert!(pb.find_hash(&psn_hash(peer.psn())).is_none());
    }

    #[test]
    fn test_refs_are_sorted() {
        let (_, pb) = phonebook();
        for name in ["c", "a", "b"] {
            pb.add_fast(record(name, Role::Client)).unwrap();
        }
        let names: Vec<String> = pb.refs().iter().map(|r| r.psn().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_slow_clears_bucket_caches() {
        let (_, pb) = phonebook();
        let global = GlobalConfig::default();
        let local = LocalConfig::new(record("mb-0", Role::MbServer), vec![2; SECRET_KEY_SIZE]);

        let existing = pb.add_fast(record("client-0", Role::Client)).unwrap();
        let existing = pb.at(&existing).unwrap();
        existing.caches().bucket_clients.set(Default::default());
        local.record.caches().bucket_mb_servers.set(Default::default());
        local.caches().tx_nodes.set(Default::default());

        pb.add_slow(record("client-1", Role::Client), &global, &local).unwrap();

        assert!(!existing.caches().bucket_clients.is_set());
        assert!(!local.record.caches().bucket_mb_servers.is_set());
        assert!(!local.caches().tx_nodes.is_set());
    }

    #[test]
    fn test_add_slow_clears_mc_leaders_in_rigid_mode() {
        let (_, pb) = phonebook();
        let global = GlobalConfig::default();
        let local = LocalConfig::new(record("c", Role::Client), vec![2; SECRET_KEY_SIZE]);
        let mb = pb.add_fast(record("mb-0", Role::MbServer)).unwrap();
        let mb = pb.at(&mb).unwrap();
        mb.caches().mc_leaders.set(Default::default());

        pb.add_slow(record("lead", Role::McLeader).with_group(0).with_order(0), &global, &local)
            .unwrap();
        assert!(!mb.caches().mc_leaders.is_set());
    }

    #[test]
    fn test_copy_from_replaces_contents() {
        let (_, a) = phonebook();
        let (_, b) = phonebook();
        a.add_fast(record("x", Role::Client)).unwrap();
        b.add_fast(record("y", Role::Client)).unwrap();
        b.copy_from(&a).unwrap();
        assert_eq!(b.refs(), a.refs());
        a.clear();
        assert_eq!(b.len(), 1);
    }
}
