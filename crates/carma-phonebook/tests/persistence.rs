use carma_crypto::PUBLIC_KEY_SIZE;
use carma_phonebook::*;
use carma_protocol::{ErrorKind, Psn, Role};
use std::sync::Arc;

const DIR: &str = "cfg/phonebook";

fn record(psn: &str, role: Role) -> PeerRecord {
    PeerRecord::new(Psn::from(psn), role, vec![9; PUBLIC_KEY_SIZE])
}

fn populated(storage: Arc<dyn Storage>) -> Phonebook {
    let pb = Phonebook::new(storage, DIR).unwrap();
    pb.add_fast(record("client-0", Role::Client)).unwrap();
    pb.add_fast(record("mb-0", Role::MbServer)).unwrap();
    pb.add_fast(record("Lead", Role::McLeader).with_group(0).with_order(0))
        .unwrap();
    pb
}

/// Fails every write of a `done` marker, as a crash between the data and
/// the marker would leave things
struct CrashBeforeDone(Arc<MemStorage>);

impl Storage for CrashBeforeDone {
    fn exists(&self, path: &str) -> Result<bool> {
        self.0.exists(path)
    }
    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        self.0.list_dir(path)
    }
    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.0.read_file(path)
    }
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        if path.ends_with("/done") {
            return Err(PhonebookError::Config("simulated crash".to_string()));
        }
        self.0.write_file(path, data)
    }
    fn make_dir(&self, path: &str) -> Result<()> {
        self.0.make_dir(path)
    }
    fn remove_dir(&self, path: &str) -> Result<()> {
        self.0.remove_dir(path)
    }
}

#[test]
fn test_flush_is_idempotent() {
    let storage = Arc::new(MemStorage::new());
    let pb = populated(storage.clone());
    pb.flush(false).unwrap();
    let first = storage.files();
    pb.flush(false).unwrap();
    assert_eq!(storage.files(), first);

    let reloaded = Phonebook::load(storage.clone(), DIR).unwrap();
    assert_eq!(reloaded.resident(), 0);
    reloaded.flush(false).unwrap();
    assert_eq!(storage.files(), first);

    pb.flush(true).unwrap();
    let packed = storage.files();
    pb.flush(true).unwrap();
    assert_eq!(storage.files(), packed);
}

#[test]
fn test_unpacked_files_are_named_by_slug() {
    let storage = Arc::new(MemStorage::new());
    populated(storage.clone()).flush(false).unwrap();
    assert!(storage.exists("cfg/phonebook/unpacked/%4Cead").unwrap());
    assert!(storage.exists("cfg/phonebook/unpacked/client-0").unwrap());
    assert!(!storage.exists("cfg/phonebook/packed").unwrap());
}

#[test]
fn test_unpacked_entries_take_precedence_over_packed() {
    let storage = Arc::new(MemStorage::new());
    populated(storage.clone()).flush(true).unwrap();
    assert!(!storage.exists("cfg/phonebook/unpacked").unwrap());

    let newer = record("client-0", Role::IdleServer);
    write_atomic_json(&*storage, "cfg/phonebook/unpacked/client-0", &newer.to_json()).unwrap();

    let pb = Phonebook::load(storage.clone(), DIR).unwrap();
    assert_eq!(pb.len(), 3);
    assert_eq!(pb.get(&Psn::from("client-0")).unwrap().role, Role::IdleServer);
    assert_eq!(pb.get(&Psn::from("mb-0")).unwrap().role, Role::MbServer);
    assert!(storage.exists("cfg/phonebook/packed").unwrap());

    pb.flush(false).unwrap();
    assert!(!storage.exists("cfg/phonebook/packed").unwrap());
    let pb = Phonebook::load(storage.clone(), DIR).unwrap();
    assert_eq!(pb.get(&Psn::from("client-0")).unwrap().role, Role::IdleServer);
    assert_eq!(pb.len(), 3);
}

#[test]
fn test_fully_subsumed_packed_file_is_removed_on_load() {
    let storage = Arc::new(MemStorage::new());
    let pb = populated(storage.clone());
    pb.flush(true).unwrap();
    for peer in pb.refs() {
        let record = pb.at(&peer).unwrap();
        let file = format!("cfg/phonebook/unpacked/{}", slugify(peer.psn().as_str()));
        write_atomic_json(&*storage, &file, &record.to_json()).unwrap();
    }

    let loaded = Phonebook::load(storage.clone(), DIR).unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(!storage.exists("cfg/phonebook/packed").unwrap());
}

#[test]
fn test_flush_removes_dangling_files() {
    let storage = Arc::new(MemStorage::new());
    let pb = populated(storage.clone());
    pb.flush(false).unwrap();
    pb.remove(&pb.expect(&Psn::from("mb-0")).unwrap()).unwrap();
    pb.flush(false).unwrap();
    assert!(!storage.exists("cfg/phonebook/unpacked/mb-0").unwrap());
    assert_eq!(Phonebook::load(storage, DIR).unwrap().len(), 2);
}

#[test]
fn test_interrupted_write_keeps_previous_version() {
    let inner = Arc::new(MemStorage::new());
    write_atomic_file(&*inner, "cfg/local.json", b"committed").unwrap();

    let crashing = CrashBeforeDone(inner.clone());
    assert!(write_atomic_file(&crashing, "cfg/local.json", b"torn").is_err());

    assert_eq!(
        read_atomic_file(&*inner, "cfg/local.json").unwrap().unwrap(),
        b"committed"
    );
    assert_eq!(inner.list_dir("cfg/local.json").unwrap().len(), 1);
}

#[test]
fn test_evicted_entries_reload_from_disk() {
    let storage = Arc::new(MemStorage::new());
    let pb = populated(storage.clone()).with_max_resident(1);
    pb.flush(false).unwrap();
    assert_eq!(pb.resident(), 1);

    for peer in pb.refs() {
        assert_eq!(pb.at(&peer).unwrap().psn, *peer.psn());
        assert!(pb.resident() <= 1);
    }
}

#[test]
fn test_evicted_entry_without_file_is_stale() {
    let storage = Arc::new(MemStorage::new());
    let pb = Phonebook::new(storage.clone(), DIR).unwrap().with_max_resident(1);
    pb.add_fast(record("a", Role::Client)).unwrap();
    pb.add_fast(record("b", Role::Client)).unwrap();
    pb.flush(false).unwrap();

    storage.remove_dir("cfg/phonebook/unpacked/a").unwrap();
    let err = pb.at(&pb.expect(&Psn::from("a")).unwrap()).unwrap_err();
    assert!(matches!(err, PhonebookError::StaleReference(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_in_memory_entries_are_never_evicted() {
    let storage = Arc::new(MemStorage::new());
    let pb = Phonebook::new(storage, DIR).unwrap().with_max_resident(0);
    pb.add_fast(record("a", Role::Client)).unwrap();
    pb.add_fast(record("b", Role::Client)).unwrap();
    assert_eq!(pb.resident(), 2);
}

#[test]
fn test_fs_storage_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(dir.path()));
    let pb = populated(storage.clone());
    pb.flush(false).unwrap();

    let loaded = Phonebook::load(storage, DIR).unwrap();
    assert_eq!(loaded.refs(), pb.refs());
    let lead = loaded.get(&Psn::from("Lead")).unwrap();
    assert_eq!(lead.role, Role::McLeader);
    assert_eq!(lead.group, Some(0));
    assert!(dir.path().join("cfg/phonebook/unpacked/%4Cead").is_dir());
}
