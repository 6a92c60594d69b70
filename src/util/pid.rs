//! Small integer identifiers with "smallest unused" reuse.

/// Identifier of a player or component, unique within its own namespace.
pub type Pid = u32;

/// Smallest non-negative integer absent from `used`.
///
/// Returns 0 for an empty set and the first gap for a sparse one.
pub fn smallest_unused<I>(used: I) -> Pid
where
    I: IntoIterator<Item = Pid>,
{
    let mut taken: Vec<Pid> = used.into_iter().collect();
    taken.sort_unstable();
    taken.dedup();

    let mut candidate: Pid = 0;
    for pid in taken {
        if pid == candidate {
            candidate += 1;
        } else if pid > candidate {
            break;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_empty_set() {
        assert_eq!(smallest_unused(Vec::new()), 0);
    }

    #[test]
    fn test_dense_set() {
        assert_eq!(smallest_unused([0, 1, 2]), 3);
    }

    #[test]
    fn test_sparse_set() {
        assert_eq!(smallest_unused([0, 1, 3, 7]), 2);
        assert_eq!(smallest_unused([1, 2, 3]), 0);
    }

    #[test]
    fn test_unsorted_with_duplicates() {
        assert_eq!(smallest_unused([4, 0, 2, 1, 1, 0]), 3);
    }

    proptest! {
        #[test]
        fn prop_result_is_smallest_gap(used in proptest::collection::btree_set(0u32..64, 0..48)) {
            let result = smallest_unused(used.iter().copied());
            prop_assert!(!used.contains(&result));
            let below: BTreeSet<u32> = (0..result).collect();
            prop_assert!(below.is_subset(&used));
        }
    }
}
