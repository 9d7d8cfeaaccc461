//! Collision-resistant identifiers for categories and expenses.
//!
//! Ids look like `cat_1718000000000_7_3fa9c2d1`: prefix, unix millis, a
//! process-wide monotonic counter and a random suffix. The counter alone
//! keeps ids unique when several entities are created in the same millisecond;
//! the suffix keeps two processes sharing a backend from colliding.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Prefix for category ids
pub const CATEGORY_PREFIX: &str = "cat";
/// Prefix for expense ids
pub const EXPENSE_PREFIX: &str = "exp";

/// Generates a fresh id with the given prefix.
#[must_use]
pub fn next_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{millis}_{seq}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_unique_within_same_millisecond() {
        let ids: HashSet<String> = (0..1_000).map(|_| next_id(CATEGORY_PREFIX)).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_id_carries_prefix() {
        assert!(next_id(EXPENSE_PREFIX).starts_with("exp_"));
    }
}
