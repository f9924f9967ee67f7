//! Configuration Management Module
//!
//! Persistent storage of the managed-server list.

pub mod storage;

pub use storage::{config_dir, servers_file, ConfigStorage, ServersFile, StorageError};
