//! Delta-compressed page-number lists.
//!
//! A list of strictly ascending `u32` page numbers is stored as a 4-byte
//! little-endian count followed by one entry per number. Each entry encodes
//! the gap to the previous number (`p - prev - 1`, absolute for the first) in
//! either a single byte with the MSB set (gap < 128) or four big-endian bytes
//! with the MSB clear.

use std::collections::BTreeSet;

use crate::codec::wire::{put_uint_be, put_uint_le, ByteReader};
use crate::error::{DedupError, DedupResult};

/// Appends the encoded list to `out`.
///
/// Taking a `BTreeSet` keeps the input strictly ascending and free of
/// duplicates, which the `p - prev - 1` delta relies on.
pub fn write_pagenr_list(out: &mut Vec<u8>, nums: &BTreeSet<u32>) -> DedupResult<()> {
    put_uint_le(out, nums.len() as u64, 4);

    let mut prev = 0u32;
    let mut first = true;
    for &pagenr in nums {
        let delta = if first {
            first = false;
            pagenr
        } else {
            pagenr - prev - 1
        };

        if delta < 128 {
            // short form: the high bit marks a one-byte entry
            put_uint_be(out, delta | 0x80, 1);
        } else {
            if delta >= 1 << 31 {
                return Err(DedupError::ValueOutOfRange {
                    what: "page number delta",
                    value: u64::from(delta),
                });
            }
            put_uint_be(out, delta, 4);
        }
        prev = pagenr;
    }
    Ok(())
}

/// Parses an encoded list back into ascending page numbers.
pub fn read_pagenr_list(r: &mut ByteReader<'_>) -> DedupResult<Vec<u32>> {
    let count = r.read_u32_le("page number list count")?;
    // each entry takes at least one byte, so a count beyond the remaining
    // input is corrupt; cap the reservation rather than trust the field
    let mut nums = Vec::with_capacity((count as usize).min(r.remaining()));

    let mut prev = 0u32;
    for i in 0..count {
        let first_byte = r.read_u8("page number entry")?;
        let delta = if first_byte & 0x80 != 0 {
            u32::from(first_byte & 0x7F)
        } else {
            let rest = r.read_exact(3, "page number entry")?;
            (u32::from(first_byte) << 24)
                | (u32::from(rest[0]) << 16)
                | (u32::from(rest[1]) << 8)
                | u32::from(rest[2])
        };

        let pagenr = if i == 0 {
            delta
        } else {
            prev.checked_add(delta)
                .and_then(|n| n.checked_add(1))
                .ok_or(DedupError::ValueOutOfRange {
                    what: "page number",
                    value: u64::from(prev) + u64::from(delta) + 1,
                })?
        };
        nums.push(pagenr);
        prev = pagenr;
    }
    Ok(nums)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(nums: &[u32]) {
        let set: BTreeSet<u32> = nums.iter().copied().collect();
        let mut buf = Vec::new();
        write_pagenr_list(&mut buf, &set).unwrap();

        let mut r = ByteReader::new(&buf);
        let decoded = read_pagenr_list(&mut r).unwrap();
        assert_eq!(decoded, nums);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn empty_list_is_just_the_count() {
        let mut buf = Vec::new();
        write_pagenr_list(&mut buf, &BTreeSet::new()).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn consecutive_numbers_use_zero_deltas() {
        let set: BTreeSet<u32> = [4, 5, 6].into_iter().collect();
        let mut buf = Vec::new();
        write_pagenr_list(&mut buf, &set).unwrap();
        // count, then 4 | 0x80, then two zero gaps with the short-form bit
        assert_eq!(buf, [3, 0, 0, 0, 0x84, 0x80, 0x80]);
    }

    #[test]
    fn wide_delta_is_big_endian_with_clear_msb() {
        let set: BTreeSet<u32> = [0, 70_000].into_iter().collect();
        let mut buf = Vec::new();
        write_pagenr_list(&mut buf, &set).unwrap();
        // delta = 70000 - 0 - 1 = 69999 = 0x0001116F, encoded big-endian
        assert_eq!(buf, [2, 0, 0, 0, 0x80, 0x00, 0x01, 0x11, 0x6F]);
    }

    #[test]
    fn round_trips() {
        round_trip(&[]);
        round_trip(&[0]);
        round_trip(&[127]);
        round_trip(&[128]);
        round_trip(&[0, 1, 2, 3, 130, 1_000_000, 2_000_000_000]);
    }

    #[test]
    fn oversized_count_fails_instead_of_reserving() {
        // count field claims ~2^31 entries but the input ends immediately
        let mut r = ByteReader::new(&[0xFF, 0xFF, 0xFF, 0x7F]);
        assert!(matches!(
            read_pagenr_list(&mut r),
            Err(DedupError::Truncated { .. })
        ));
    }

    #[test]
    fn delta_too_large_is_rejected() {
        let set: BTreeSet<u32> = [0, u32::MAX].into_iter().collect();
        let mut buf = Vec::new();
        assert!(matches!(
            write_pagenr_list(&mut buf, &set),
            Err(DedupError::ValueOutOfRange { .. })
        ));
    }
}
