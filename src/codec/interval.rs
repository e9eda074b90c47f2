//! Run-length interval lists over sorted page-number sets.
//!
//! A sorted set is first merged into inclusive `[left, right]` intervals of
//! consecutive numbers. Each interval is stored as a 4-byte little-endian
//! word — `left` in the low 29 bits, a 2-bit width code for the `right - left`
//! delta, and a termination bit on the final interval — followed by the delta
//! in 0, 1, 2 or 4 little-endian bytes. The format cannot express an empty
//! list: a reader keeps pulling intervals until it sees the termination bit,
//! so writers only emit lists for non-empty sets.

use std::collections::BTreeSet;

use crate::codec::wire::{put_uint_le, ByteReader};
use crate::error::{DedupError, DedupResult};

/// `left` must fit in 29 bits.
const LEFT_LIMIT: u32 = 1 << 29;

/// Merges a sorted set into maximal inclusive intervals of consecutive numbers.
pub fn intervalize(nums: &BTreeSet<u32>) -> Vec<(u32, u32)> {
    let mut intervals = Vec::new();
    let mut iter = nums.iter().copied();

    let Some(first) = iter.next() else {
        return intervals;
    };

    let mut curr = (first, first);
    for n in iter {
        if curr.1 + 1 == n {
            curr.1 = n;
        } else {
            intervals.push(curr);
            curr = (n, n);
        }
    }
    intervals.push(curr);
    intervals
}

/// Appends one encoded interval to `out`.
fn write_interval(out: &mut Vec<u8>, left: u32, right: u32, last: bool) -> DedupResult<()> {
    if left >= LEFT_LIMIT {
        return Err(DedupError::ValueOutOfRange {
            what: "interval left bound",
            value: u64::from(left),
        });
    }
    debug_assert!(left <= right);

    let term = if last { 4u32 } else { 0 };

    // singletons carry no delta bytes at all
    if left == right {
        put_uint_le(out, u64::from((term << 29) | left), 4);
        return Ok(());
    }

    let delta = right - left;
    let (width, code) = if delta < 1 << 8 {
        (1, 1u32)
    } else if delta < 1 << 16 {
        (2, 2)
    } else {
        (4, 3)
    };

    put_uint_le(out, u64::from(((term | code) << 29) | left), 4);
    put_uint_le(out, u64::from(delta), width);
    Ok(())
}

/// Appends the encoded interval list for a non-empty set to `out`.
///
/// Callers must not pass an empty set; the encoding has no way to terminate a
/// list with zero intervals.
pub fn write_interval_list(out: &mut Vec<u8>, nums: &BTreeSet<u32>) -> DedupResult<()> {
    let intervals = intervalize(nums);
    debug_assert!(!intervals.is_empty(), "empty interval list is unencodable");

    let count = intervals.len();
    for (i, (left, right)) in intervals.into_iter().enumerate() {
        write_interval(out, left, right, i + 1 == count)?;
    }
    Ok(())
}

/// Parses intervals until one carries the termination bit.
pub fn read_interval_list(r: &mut ByteReader<'_>) -> DedupResult<Vec<(u32, u32)>> {
    let mut intervals = Vec::new();

    loop {
        let word = r.read_u32_le("interval word")?;
        let upper = word >> 29;
        let last = upper & 4 != 0;
        let code = upper & 3;
        let left = word & (LEFT_LIMIT - 1);

        let width = match code {
            0 => 0,
            1 => 1,
            2 => 2,
            3 => 4,
            _ => unreachable!(),
        };
        let delta = if width == 0 {
            0
        } else {
            r.read_uint_le(width, "interval delta")? as u32
        };

        let right = left.checked_add(delta).ok_or(DedupError::InvalidInterval {
            left,
            right: left.wrapping_add(delta),
        })?;
        intervals.push((left, right));

        if last {
            return Ok(intervals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(nums: &[u32]) -> BTreeSet<u32> {
        nums.iter().copied().collect()
    }

    fn round_trip(nums: &[u32]) -> Vec<(u32, u32)> {
        let mut buf = Vec::new();
        write_interval_list(&mut buf, &set(nums)).unwrap();

        let mut r = ByteReader::new(&buf);
        let decoded = read_interval_list(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        decoded
    }

    #[test]
    fn merges_consecutive_runs() {
        assert_eq!(intervalize(&set(&[])), vec![]);
        assert_eq!(intervalize(&set(&[7])), vec![(7, 7)]);
        assert_eq!(
            intervalize(&set(&[0, 1, 2, 5, 6, 9])),
            vec![(0, 2), (5, 6), (9, 9)]
        );
    }

    #[test]
    fn intervalize_is_idempotent() {
        let nums = set(&[0, 1, 2, 10, 11, 40, 42, 44, 45]);
        let intervals = intervalize(&nums);

        let unfolded: BTreeSet<u32> = intervals
            .iter()
            .flat_map(|&(l, r)| l..=r)
            .collect();
        assert_eq!(intervalize(&unfolded), intervals);
    }

    #[test]
    fn singleton_is_one_word() {
        let mut buf = Vec::new();
        write_interval_list(&mut buf, &set(&[3])).unwrap();
        // termination bit set, width code 0, left = 3
        assert_eq!(buf, (4u32 << 29 | 3).to_le_bytes());
    }

    #[test]
    fn termination_bit_only_on_last() {
        let mut buf = Vec::new();
        write_interval_list(&mut buf, &set(&[3, 5, 7])).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(buf[3] & 0x80, 0);
        assert_eq!(buf[7] & 0x80, 0);
        assert_eq!(buf[11] & 0x80, 0x80);
    }

    #[test]
    fn delta_width_selection() {
        // widths 1, 2 and 4 for growing deltas
        assert_eq!(round_trip(&(0..=255).collect::<Vec<_>>()), vec![(0, 255)]);

        let wide: Vec<u32> = (0..=300).collect();
        assert_eq!(round_trip(&wide), vec![(0, 300)]);

        let mut buf = Vec::new();
        write_interval_list(&mut buf, &set(&[0, 1])).unwrap();
        assert_eq!(buf.len(), 5); // word + 1 delta byte

        buf.clear();
        let huge: BTreeSet<u32> = [0, 1 << 20].into_iter().collect();
        let intervals = intervalize(&huge);
        assert_eq!(intervals, vec![(0, 0), (1 << 20, 1 << 20)]);
    }

    #[test]
    fn large_interval_round_trips() {
        let mut buf = Vec::new();
        write_interval(&mut buf, 0, 1 << 20, true).unwrap();
        let mut r = ByteReader::new(&buf);
        assert_eq!(read_interval_list(&mut r).unwrap(), vec![(0, 1 << 20)]);
    }

    #[test]
    fn left_bound_limit_is_enforced() {
        let mut buf = Vec::new();
        assert!(matches!(
            write_interval(&mut buf, LEFT_LIMIT, LEFT_LIMIT, true),
            Err(DedupError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn round_trips() {
        round_trip(&[0]);
        round_trip(&[3, 5, 7]);
        round_trip(&[0, 1, 2, 3, 4, 5]);
        round_trip(&[10, 11, 12, 100, 200, 201, 500_000]);
    }
}
