// Key-based merge of a local cache with a fresh remote read.

use std::collections::BTreeMap;

/// Merge `remote` into `local`, matching entries by `key`. Entries present on
/// both sides take the remote value; entries only one side has are kept.
/// The result is ordered by ascending key.
pub fn merge_by_key<T, K, F>(local: Vec<T>, remote: Vec<T>, key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut merged: BTreeMap<K, T> = BTreeMap::new();
    for item in local {
        merged.insert(key(&item), item);
    }
    for item in remote {
        merged.insert(key(&item), item);
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: i64,
        label: &'static str,
    }

    fn e(id: i64, label: &'static str) -> Entry {
        Entry { id, label }
    }

    #[test]
    fn remote_wins_on_conflict() {
        let merged = merge_by_key(vec![e(1, "local")], vec![e(1, "remote")], |x| x.id);
        assert_eq!(merged, vec![e(1, "remote")]);
    }

    #[test]
    fn keeps_entries_from_both_sides() {
        let merged = merge_by_key(
            vec![e(3, "local-only"), e(1, "shared-local")],
            vec![e(2, "remote-only"), e(1, "shared-remote")],
            |x| x.id,
        );
        assert_eq!(
            merged,
            vec![e(1, "shared-remote"), e(2, "remote-only"), e(3, "local-only")]
        );
    }

    #[test]
    fn empty_remote_returns_local() {
        let merged = merge_by_key(vec![e(2, "a"), e(1, "b")], Vec::new(), |x| x.id);
        assert_eq!(merged, vec![e(1, "b"), e(2, "a")]);
    }

    #[test]
    fn duplicate_keys_within_one_side_collapse_to_last() {
        let merged = merge_by_key(Vec::new(), vec![e(1, "first"), e(1, "second")], |x| x.id);
        assert_eq!(merged, vec![e(1, "second")]);
    }
}
