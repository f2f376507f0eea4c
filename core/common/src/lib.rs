//! Common types shared across the fragments client crates.
//!
//! This module provides the fragment record model, the id newtypes that
//! separate offline ids from server ids, and the error taxonomy used by the
//! store, the remote client and the sync coordinator.

pub mod content;
pub mod error;
pub mod types;

pub use content::{base_type, extension_for_type, type_for_extension, FragmentContent};
pub use error::{Error, Result};
pub use types::{FragmentId, FragmentRecord, OwnerId, OFFLINE_ID_PREFIX};
