//! Versioned cache storage.
//!
//! The `CacheRegistry` owns the named stores of the current generation
//! (`static-v<version>` and `dynamic-v<version>`) on top of a pluggable
//! `CacheBackend`:
//! - `MemoryBackend` keeps everything in process memory
//! - `FileBackend` keeps one JSON file per store on disk
//!
//! Entries are whole-response snapshots keyed by request identity. Writes
//! replace entries wholesale, so concurrent writers to one key resolve as
//! last-write-wins.

pub mod backend;
pub mod file;
pub mod registry;

pub use backend::{CacheBackend, CachedData, CachedResponse, MemoryBackend};
pub use file::FileBackend;
pub use registry::{CacheNames, CacheRegistry, CacheRole, Store};
