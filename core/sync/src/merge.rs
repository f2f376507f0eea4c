//! Union of local and remote listings.

use std::collections::HashSet;

use fragments_common::{FragmentId, FragmentRecord};

/// Merge the local records of an owner with the server's listing.
///
/// Each id appears once. When both sides know an id the local record wins,
/// keeping its pending flag and payload. Local records come first, then
/// remote-only records in server order, and the result is stably sorted by
/// `created`, newest first.
pub fn merge_listing(
    local: Vec<FragmentRecord>,
    remote: Vec<FragmentRecord>,
) -> Vec<FragmentRecord> {
    let mut seen: HashSet<FragmentId> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged = Vec::with_capacity(local.len() + remote.len());

    for record in local.into_iter().chain(remote) {
        if seen.insert(record.id.clone()) {
            merged.push(record);
        }
    }

    merged.sort_by(|a, b| b.created.cmp(&a.created));
    merged
}
