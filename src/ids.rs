//! Time-ordered unique message identifiers.
//!
//! Backed by UUIDv7 (RFC 9562): a 48-bit millisecond timestamp followed by
//! monotonic counter bits and a random tail. Rendered in canonical
//! hyphenated text form, two IDs compare in creation order because the
//! timestamp occupies the leading bytes — this is what lets `pop`'s
//! `ORDER BY created_at, id` tie-break fall out for free.

use uuid::Uuid;

/// Generate a new message ID, unique within this process and
/// lexicographically ordered by generation time across calls.
pub fn generate() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let mut ids: Vec<String> = (0..50).map(|_| generate()).collect();
        let sorted = {
            let mut v = ids.clone();
            v.sort();
            v
        };
        // generate() is called in increasing time order, so the sequence
        // returned is already non-decreasing.
        assert_eq!(ids, sorted);
        ids.dedup();
        assert_eq!(ids.len(), sorted.len());
    }
}
