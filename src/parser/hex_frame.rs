//! Kind 2: fixed-width ASCII hexadecimal frames
//!
//! Every frame is `sum(header_len)` characters long and each field is
//! `header_len[i]` hex digits, read big-endian. `"43200007241"` with
//! `header_len = [3, 8]` is id `0x432`, value `0x7241`.

use super::IdClock;
use crate::config::FrameFormat;
use crate::types::{Packet, PacketValue, SeriesKey};

pub fn extract(format: &FrameFormat, buffer: &mut Vec<u8>, clock: &mut IdClock) -> Vec<Packet> {
    let width = format.total_len();
    if width == 0 {
        return Vec::new();
    }
    let consumed = buffer.len() - buffer.len() % width;

    let mut packets = Vec::new();
    for window in buffer[..consumed].chunks_exact(width) {
        let Some(fields) = decode_window(window, &format.header_len) else {
            tracing::trace!("Dropped non-hex frame {:?}", String::from_utf8_lossy(window));
            continue;
        };
        let &[id, value, ..] = fields.as_slice() else {
            continue;
        };
        if !format.accepts(id) {
            tracing::trace!("Dropped frame with id {:#x}", id);
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

/// Decode every field of one window, or `None` if any slice is not hex
fn decode_window(window: &[u8], header_len: &[u32]) -> Option<Vec<u128>> {
    let mut fields = Vec::with_capacity(header_len.len());
    let mut offset = 0;
    for &len in header_len {
        let end = offset + len as usize;
        fields.push(parse_hex(&window[offset..end])?);
        offset = end;
    }
    Some(fields)
}

fn parse_hex(digits: &[u8]) -> Option<u128> {
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u128::from_str_radix(text, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> FrameFormat {
        FrameFormat {
            header_order: vec!["ID".into(), "DATA".into()],
            header_len: vec![3, 8],
            packet_ids: vec!["0x432".into()],
            id_values: vec![0x432],
        }
    }

    #[test]
    fn test_reference_stream() {
        let input = b"4320000724143200007999434000071104300";
        let mut buffer = input.to_vec();
        let packets = extract(&format(), &mut buffer, &mut IdClock::new());

        let decoded: Vec<_> = packets
            .iter()
            .map(|p| (p.series.clone(), p.value.clone()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (SeriesKey::Int(0x432), PacketValue::Int(0x7241)),
                (SeriesKey::Int(0x432), PacketValue::Int(0x7999)),
            ]
        );
        assert_eq!(buffer, &input[33..]);
    }

    #[test]
    fn test_partial_frame_completes_later() {
        let fmt = format();
        let mut clock = IdClock::new();
        let mut buffer = b"4320000".to_vec();
        assert!(extract(&fmt, &mut buffer, &mut clock).is_empty());
        assert_eq!(buffer, b"4320000");

        buffer.extend_from_slice(b"00FF");
        let packets = extract(&fmt, &mut buffer, &mut clock);
        assert_eq!(packets[0].value, PacketValue::Int(0xff));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_non_hex_frame_dropped() {
        let mut buffer = b"432zzzz7241".to_vec();
        assert!(extract(&format(), &mut buffer, &mut IdClock::new()).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sign_is_not_a_digit() {
        assert_eq!(parse_hex(b"+1"), None);
        assert_eq!(parse_hex(b"aF"), Some(0xaf));
    }
}
