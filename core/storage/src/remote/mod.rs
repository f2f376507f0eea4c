//! Remote fragments API.
//!
//! This module provides the client side of the fragments microservice:
//! - `AuthProvider` supplying the signed-in user and its bearer headers
//! - `RemoteFragments`, the operations the sync layer needs from the API
//! - `HttpFragmentsClient`, the REST implementation over `reqwest`

pub mod auth;
pub mod client;

pub use auth::{AuthProvider, StaticTokenAuth, User};
pub use client::HttpFragmentsClient;

use async_trait::async_trait;

use fragments_common::{FragmentContent, FragmentId, FragmentRecord, Result};

/// Operations offered by the remote fragments API.
///
/// Any non-success status is reported as `Error::RemoteRejected` and any
/// transport failure as `Error::RemoteUnreachable`.
#[async_trait]
pub trait RemoteFragments: Send + Sync {
    /// Get the backend name (e.g., "http").
    fn name(&self) -> &str;

    /// Health check against the API root.
    async fn ping(&self) -> Result<()>;

    /// Ids of the current user's fragments.
    async fn list_ids(&self) -> Result<Vec<FragmentId>>;

    /// Metadata of the current user's fragments. Records carry no payload.
    async fn list_expanded(&self) -> Result<Vec<FragmentRecord>>;

    /// Create a fragment and return the server's record for it.
    async fn create(&self, content_type: &str, data: Vec<u8>) -> Result<FragmentRecord>;

    /// Raw content of a fragment.
    async fn fetch(&self, id: &FragmentId) -> Result<FragmentContent>;

    /// Content converted to the format implied by `ext` (e.g. "html").
    async fn convert(&self, id: &FragmentId, ext: &str) -> Result<FragmentContent>;

    /// Replace the content of a fragment.
    async fn update(&self, id: &FragmentId, content_type: &str, data: Vec<u8>) -> Result<()>;

    /// Delete a fragment.
    async fn delete(&self, id: &FragmentId) -> Result<()>;
}
