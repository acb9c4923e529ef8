//! The versioned ("time-travel") file system: every write preserves the
//! version it replaces, addressable later by timestamp. Runs as a user
//! environment; client environments reach it over IPC (the `ipc` module)
//! using the operations on `volume::Fs`.

#![no_std]

extern crate alloc;

pub mod bitmap;
pub mod blockdev;
pub mod cache;
pub mod file_ops;
pub mod ipc;
pub mod path;
pub mod record;
pub mod volume;

pub use blockdev::{BlockDevice, MemoryBlockDevice};
pub use record::RecordLoc;
pub use volume::{new_memory_fs, Fs, FileHandle, MemoryFs};

pub mod tests;
