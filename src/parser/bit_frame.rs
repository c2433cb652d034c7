//! Kind 3: fixed-width bit-packed frames
//!
//! A frame is `ceil(sum(header_len) / 8)` bytes treated as one big-endian
//! integer. Fields are packed MSB-first into its low bits, so they are
//! peeled off from the least significant end, last field first, and then
//! put back in `header_order`.
//!
//! With `header_len = [4, 8]` the two bytes `01 8A` hold id `0b0001` and
//! value `0x8A`; the top four bits of the window are padding.

use super::IdClock;
use crate::config::FrameFormat;
use crate::types::{Packet, PacketValue, SeriesKey};

/// Bytes needed to hold `bits`
pub fn window_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

pub fn extract(format: &FrameFormat, buffer: &mut Vec<u8>, clock: &mut IdClock) -> Vec<Packet> {
    let width = window_len(format.total_len());
    if width == 0 {
        return Vec::new();
    }
    let consumed = buffer.len() - buffer.len() % width;

    let mut packets = Vec::new();
    for window in buffer[..consumed].chunks_exact(width) {
        let fields = decode_window(window, &format.header_len);
        let &[id, value, ..] = fields.as_slice() else {
            continue;
        };
        if !format.accepts(id) {
            tracing::trace!("Dropped frame with id {:#b}", id);
            continue;
        }
        packets.push(Packet::new(
            SeriesKey::Int(id),
            clock.mint(),
            PacketValue::Int(value),
        ));
    }

    buffer.drain(..consumed);
    packets
}

/// Split a window into its fields, in `header_order`
fn decode_window(window: &[u8], header_len: &[u32]) -> Vec<u128> {
    let mut offset = 0;
    let mut fields: Vec<u128> = header_len
        .iter()
        .rev()
        .map(|&len| {
            let field = read_bits(window, offset, len as usize);
            offset += len as usize;
            field
        })
        .collect();
    fields.reverse();
    fields
}

/// Read `width` bits (at most 128) starting `lsb_offset` bits above the
/// least significant bit of a big-endian byte string.
fn read_bits(bytes: &[u8], lsb_offset: usize, width: usize) -> u128 {
    let mut value = 0u128;
    for i in 0..width {
        let bit = lsb_offset + i;
        let byte = bytes.len() - 1 - bit / 8;
        if (bytes[byte] >> (bit % 8)) & 1 == 1 {
            value |= 1u128 << i;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn format() -> FrameFormat {
        FrameFormat {
            header_order: vec!["ID".into(), "DATA".into()],
            header_len: vec![4, 8],
            packet_ids: vec!["0b0001".into()],
            id_values: vec![1],
        }
    }

    #[test]
    fn test_reference_stream() {
        // 0b0000_0001_1000_1010_0000_0001_1111_1111
        let mut buffer = 0x018A_01FFu32.to_be_bytes().to_vec();
        let packets = extract(&format(), &mut buffer, &mut IdClock::new());

        let decoded: Vec<_> = packets
            .iter()
            .map(|p| (p.series.clone(), p.value.clone()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (SeriesKey::Int(1), PacketValue::Int(0x8A)),
                (SeriesKey::Int(1), PacketValue::Int(0xFF)),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_window_retained() {
        let mut buffer = vec![0x01, 0x8A, 0x01];
        let packets = extract(&format(), &mut buffer, &mut IdClock::new());
        assert_eq!(packets.len(), 1);
        assert_eq!(buffer, vec![0x01]);
    }

    #[test]
    fn test_unknown_id_dropped() {
        let mut buffer = vec![0x02, 0x8A];
        assert!(extract(&format(), &mut buffer, &mut IdClock::new()).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fields_wider_than_a_word() {
        // 8-bit id followed by a 128-bit value: 17-byte window
        let mut window = vec![0xA5];
        window.extend_from_slice(&u128::MAX.to_be_bytes());
        assert_eq!(decode_window(&window, &[8, 128]), vec![0xA5, u128::MAX]);
    }

    #[test]
    fn test_window_len_rounds_up() {
        assert_eq!(window_len(12), 2);
        assert_eq!(window_len(16), 2);
        assert_eq!(window_len(17), 3);
    }

    proptest! {
        #[test]
        fn prop_fields_round_trip(id in 0u128..16, value in 0u128..(1 << 20), pad in 0u128..16) {
            // 4-bit id, 20-bit value, packed into three bytes with no padding
            let packed = (id << 20) | value;
            let bytes = (packed as u32).to_be_bytes();
            prop_assert_eq!(decode_window(&bytes[1..], &[4, 20]), vec![id, value]);

            // the same fields with four padding bits on top still decode
            let padded = ((pad << 24) | packed) as u32;
            let bytes = padded.to_be_bytes();
            prop_assert_eq!(decode_window(&bytes, &[4, 20]), vec![id, value]);
        }
    }
}
