use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Upper bound on visitor ids retained in any single per-bucket set.
pub const VISITOR_SET_CAP: usize = 10_000;

/// Track `visitor` in a capped set and report whether it counts as a new arrival.
///
/// Ids already in the set never count twice. Below the cap a new id is inserted
/// and counted. Once the set is full, ids that are not in it are counted without
/// being retained, so the running total keeps growing but may over-count repeats.
///
/// Past the cap the count is unconditional only for ids the set cannot vouch
/// for. A retained id is a known repeat whether or not the set is full, and
/// counting it again would make totals for the first `cap` visitors drift the
/// moment the cap is reached.
pub fn track_visitor(set: &mut HashSet<String>, visitor: &str, cap: usize) -> bool {
    if set.contains(visitor) {
        return false;
    }
    if set.len() < cap {
        set.insert(visitor.to_string());
    }
    true
}

/// How many of `pending` a flush through [`track_visitor`] would count, without
/// touching `set`. Valid because `pending` holds distinct ids.
pub fn count_untracked(set: &HashSet<String>, pending: &HashSet<String>) -> u64 {
    pending.iter().filter(|v| !set.contains(*v)).count() as u64
}

/// Deterministic shard for a visitor id.
///
/// Uses the first 8 bytes of SHA-256 rather than `std` hashing so the
/// assignment is identical across processes and releases.
pub fn shard_of(visitor_id: &str, shard_count: u32) -> u32 {
    let digest = Sha256::digest(visitor_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(head) % u64::from(shard_count.max(1));
    // bucket < shard_count, which is a u32
    bucket as u32
}
