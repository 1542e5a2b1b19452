//! Slice count planning

/// Number of slices to split an index of `document_count` documents into.
///
/// Indices smaller than `min_docs_per_slice` (and empty ones) get a single
/// slice: the remote slice API rejects high slice counts on small indices.
/// Otherwise one slice per `min_docs_per_slice` documents, capped at `max_slices`.
pub fn plan(document_count: u64, max_slices: u32, min_docs_per_slice: u64) -> u32 {
    let max_slices = max_slices.max(1);
    let min_docs_per_slice = min_docs_per_slice.max(1);
    if document_count == 0 || document_count < min_docs_per_slice {
        return 1;
    }
    let wanted = document_count.div_ceil(min_docs_per_slice);
    wanted.min(u64::from(max_slices)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_single_slice() {
        assert_eq!(plan(0, 16, 1_000), 1);
    }

    #[test]
    fn small_index_single_slice() {
        assert_eq!(plan(999, 16, 1_000), 1);
        assert_eq!(plan(1, 16, 1_000), 1);
    }

    #[test]
    fn exact_multiple() {
        assert_eq!(plan(10_000, 16, 1_000), 10);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(plan(1_000, 16, 1_000), 1);
        assert_eq!(plan(1_001, 16, 1_000), 2);
        assert_eq!(plan(10_500, 16, 1_000), 11);
    }

    #[test]
    fn capped_at_max_slices() {
        assert_eq!(plan(1_000_000, 16, 1_000), 16);
        assert_eq!(plan(u64::MAX, 16, 1), 16);
    }

    #[test]
    fn always_positive_and_bounded() {
        for count in [0, 1, 7, 999, 1_000, 12_345, 99_999_999] {
            for max in [1, 2, 16, 1024] {
                let n = plan(count, max, 1_000);
                assert!(n >= 1 && n <= max, "plan({count}, {max}) = {n}");
            }
        }
    }

    #[test]
    fn degenerate_parameters_clamped() {
        assert_eq!(plan(10, 0, 0), 1);
    }
}
