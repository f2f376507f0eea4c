//! Offline-first synchronization for the fragments client.
//!
//! This module provides:
//! - A connectivity signal with change notification
//! - The coordinator routing each operation to the API or the local store
//! - Merging of local and remote listings
//! - Bulk resync of pending records, on demand or on reconnect
//! - Client configuration

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod locks;
pub mod merge;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, API_URL_ENV, DEFAULT_API_URL};
pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use coordinator::{Completed, Outcome, SyncCoordinator, SyncReport};
pub use locks::KeyedLocks;
pub use merge::merge_listing;
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle};
