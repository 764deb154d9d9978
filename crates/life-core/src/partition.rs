//! Remainder-first row partitioning
//!
//! The same rule splits the grid across the worker pool and a worker's band
//! across its threads: with `n` rows and `t` parts, the first `n % t` parts
//! get `n / t + 1` rows and the rest get `n / t`.

use std::ops::Range;

use crate::Band;

/// Split `range` into `parts` contiguous sub-ranges, larger ones first
///
/// Always returns exactly `parts` ranges; some are empty when the range has
/// fewer rows than parts.
pub fn split_range(range: Range<usize>, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }

    let rows = range.end.saturating_sub(range.start);
    let base = rows / parts;
    let remainder = rows % parts;

    let mut start = range.start;
    (0..parts)
        .map(|i| {
            let len = if i < remainder { base + 1 } else { base };
            let part = start..start + len;
            start += len;
            part
        })
        .collect()
}

/// Split `0..rows` into `parts` row ranges
pub fn split_rows(rows: usize, parts: usize) -> Vec<Range<usize>> {
    split_range(0..rows, parts)
}

/// One full-width band per pool slot, in increasing row order
pub fn partition_bands(height: usize, width: usize, parts: usize) -> Vec<Band> {
    split_rows(height, parts)
        .into_iter()
        .map(|rows| Band::rows(rows.start, rows.end, width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_goes_to_first_parts() {
        assert_eq!(split_rows(10, 4), vec![0..3, 3..6, 6..8, 8..10]);
        assert_eq!(split_rows(16, 4), vec![0..4, 4..8, 8..12, 12..16]);
    }

    #[test]
    fn test_more_parts_than_rows() {
        let parts = split_rows(2, 4);
        assert_eq!(parts, vec![0..1, 1..2, 2..2, 2..2]);
    }

    #[test]
    fn test_tiling_is_complete() {
        for height in 0..64 {
            for parts in 1..12 {
                let ranges = split_rows(height, parts);
                assert_eq!(ranges.len(), parts);

                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next, "gap or overlap for {height}/{parts}");
                    next = r.end;
                }
                assert_eq!(next, height);

                let sizes: Vec<_> = ranges.iter().map(|r| r.len()).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
                assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }

    #[test]
    fn test_split_offset_range() {
        assert_eq!(split_range(5..12, 3), vec![5..8, 8..10, 10..12]);
    }

    #[test]
    fn test_partition_bands_full_width() {
        let bands = partition_bands(6, 9, 4);
        assert_eq!(bands.len(), 4);
        assert!(bands.iter().all(|b| b.start_col == 0 && b.end_col == 9));
        assert_eq!(bands.iter().map(Band::height).sum::<usize>(), 6);
    }

    #[test]
    fn test_zero_parts() {
        assert!(split_rows(8, 0).is_empty());
    }
}
