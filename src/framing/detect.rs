//! Header byte-order detection

use crate::config::MAX_FRAME_SIZE_LIMIT;
use crate::types::{ByteOrder, RECORD_HEADER_SIZE, RecordHeader};

const MICROS_PER_SECOND: u32 = 1_000_000;

/// Decide the byte order of a stream from its first record header
///
/// Each order is tried in turn. An order is plausible when the captured
/// length it yields fits `max_frame_size`; it is consistent when, in
/// addition, the original length is at least the captured length and within
/// [`MAX_FRAME_SIZE_LIMIT`], and the sub-second field is below one second of
/// microseconds. The first consistent order wins, then the first plausible
/// one, with host order tried first. `None` means neither order yields a
/// usable length.
///
/// Only streams without a capture-file preamble reach this point, and those
/// carry microsecond timestamps.
pub fn detect_byte_order(bytes: &[u8; RECORD_HEADER_SIZE], max_frame_size: u32) -> Option<ByteOrder> {
    let candidates = [ByteOrder::Native, ByteOrder::Swapped].map(|order| (order, RecordHeader::parse(bytes, order)));

    let plausible = |header: &RecordHeader| header.captured_len <= max_frame_size;
    let consistent = |header: &RecordHeader| {
        plausible(header)
            && header.original_len >= header.captured_len
            && header.original_len <= MAX_FRAME_SIZE_LIMIT
            && header.ts_frac < MICROS_PER_SECOND
    };

    candidates
        .iter()
        .find(|(_, header)| consistent(header))
        .or_else(|| candidates.iter().find(|(_, header)| plausible(header)))
        .map(|(order, _)| *order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(captured_len: u32, original_len: u32) -> RecordHeader {
        RecordHeader { ts_sec: 1_700_000_000, ts_frac: 42, captured_len, original_len }
    }

    #[test]
    fn native_small_lengths_stay_native() {
        let bytes = header(60, 60).encode(ByteOrder::Native);
        assert_eq!(detect_byte_order(&bytes, 262_144), Some(ByteOrder::Native));
    }

    #[test]
    fn swapped_small_lengths_detected() {
        let bytes = header(60, 60).encode(ByteOrder::Swapped);
        assert_eq!(detect_byte_order(&bytes, 262_144), Some(ByteOrder::Swapped));
    }

    #[test]
    fn original_length_breaks_ties() {
        // 65536 swapped reads as 256 natively, which fits the bound, but the
        // native reading of original_len is far beyond any frame size.
        let bytes = header(65_536, 65_540).encode(ByteOrder::Swapped);
        assert_eq!(detect_byte_order(&bytes, 262_144), Some(ByteOrder::Swapped));
    }

    #[test]
    fn fractional_seconds_break_ties() {
        // 256/256 swapped reads as 65536/65536 natively, which is consistent
        // on lengths alone; the sub-second field is not.
        let bytes = header(256, 256).encode(ByteOrder::Swapped);
        assert_eq!(detect_byte_order(&bytes, 262_144), Some(ByteOrder::Swapped));
    }

    #[test]
    fn implausible_in_both_orders() {
        let bytes = header(0x0100_0100, 0x0100_0100).encode(ByteOrder::Native);
        assert_eq!(detect_byte_order(&bytes, 1_000), None);
    }

    proptest! {
        #[test]
        fn detects_producer_order_for_typical_frames(
            captured in 14u32..=9_000,
            extra in 0u32..=1_000,
            swapped in any::<bool>()
        ) {
            let order = if swapped { ByteOrder::Swapped } else { ByteOrder::Native };
            let bytes = header(captured, captured + extra).encode(order);
            prop_assert_eq!(detect_byte_order(&bytes, 262_144), Some(order));
        }
    }
}
