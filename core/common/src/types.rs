//! Fragment records and the identifiers that key them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved prefix carried by every locally generated fragment id.
///
/// Server ids never start with this prefix, so the coordinator can tell a
/// record the API has never seen from one it has confirmed.
pub const OFFLINE_ID_PREFIX: &str = "offline-";

/// Identifier of a fragment, either server-assigned or offline-generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(String);

impl FragmentId {
    /// Create a FragmentId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "FragmentId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh offline id.
    ///
    /// Format: `offline-<unix millis>-<uuid v4 simple>`.
    pub fn generate_offline() -> Self {
        Self(format!(
            "{}{}-{}",
            OFFLINE_ID_PREFIX,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    /// Whether this id was generated locally and is unknown to the server.
    pub fn is_offline(&self) -> bool {
        self.0.starts_with(OFFLINE_ID_PREFIX)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the user owning a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new OwnerId.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "OwnerId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored fragment: metadata plus its raw payload.
///
/// Field names follow the API's JSON (`ownerId`, `type`, ...). Server
/// metadata carries neither `pendingSync` nor `data`, so both default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    pub id: FragmentId,
    pub owner_id: OwnerId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(rename = "type")]
    pub fragment_type: String,
    pub size: u64,
    #[serde(default)]
    pub pending_sync: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl FragmentRecord {
    /// Build a record that only exists locally.
    ///
    /// # Postconditions
    /// - `id` is a fresh offline id
    /// - `pending_sync` is true
    /// - `created == updated`
    pub fn new_offline(owner_id: OwnerId, fragment_type: impl Into<String>, data: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: FragmentId::generate_offline(),
            owner_id,
            created: now,
            updated: now,
            fragment_type: fragment_type.into(),
            size: data.len() as u64,
            pending_sync: true,
            data,
        }
    }

    /// Replace the payload and bump `updated`.
    ///
    /// `updated` never moves below `created`, even with a skewed clock.
    pub fn touch(&mut self, fragment_type: impl Into<String>, data: Vec<u8>) {
        self.fragment_type = fragment_type.into();
        self.size = data.len() as u64;
        self.data = data;
        self.updated = Utc::now().max(self.created);
    }

    /// Adopt a server-confirmed record as the local mirror.
    ///
    /// The server's metadata wins; owner and payload come from the local side.
    pub fn confirmed(mut server: FragmentRecord, owner_id: OwnerId, data: Vec<u8>) -> Self {
        server.owner_id = owner_id;
        server.pending_sync = false;
        server.size = data.len() as u64;
        server.data = data;
        server
    }
}
