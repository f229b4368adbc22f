//! CARMA Phonebook
//!
//! The peer directory and the storage layer underneath every persisted
//! CARMA file: logical paths, storage backends, crash-safe atomic files,
//! and the global and local configuration records.

pub mod atomic;
pub mod cache;
pub mod error;
pub mod global;
pub mod local;
pub mod path;
pub mod phonebook;
pub mod record;
pub mod slug;
pub mod storage;

pub use atomic::{
    delete_atomic_file, read_atomic_file, read_atomic_json, write_atomic_file, write_atomic_json,
};
pub use cache::CacheCell;
pub use error::{PhonebookError, Result};
pub use global::GlobalConfig;
pub use local::{LocalCaches, LocalConfig, LocalJson};
pub use path::normalize_path;
pub use phonebook::Phonebook;
pub use record::{PeerRecord, PeerRef, PeerSet, RecordCaches, RecordJson};
pub use slug::{slugify, unslugify};
pub use storage::{FsStorage, MemStorage, Storage};
