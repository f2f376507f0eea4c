//! Local and remote fragment storage.
//!
//! This module provides a trait-based interface for local fragment stores
//! (SQLite on disk, in-memory), a registry for resolving a store by name
//! and configuration, and the HTTP client for the remote fragments API.
//!
//! # Design Principles
//! - Async operations: All I/O operations are async
//! - Explicit handles: Stores are constructed and passed around, never global
//! - Unified error semantics: Consistent error types across backends

pub mod memory;
pub mod registry;
pub mod remote;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
pub use remote::{AuthProvider, HttpFragmentsClient, RemoteFragments, StaticTokenAuth, User};
pub use sqlite::SqliteStore;
pub use store::FragmentStore;
