//! Kind 0: delimiter-separated `id<delim>value` segments
//!
//! The buffer is cut on any packet delimiter. The trailing piece after the
//! last delimiter is never parsed, since a missing delimiter cannot be told
//! apart from a truncated read; it stays buffered. Each complete segment has
//! the `ignore` strings removed and is split on the data delimiters. Only
//! segments with exactly two parts, a whitelisted id and a non-empty value
//! become packets.

use super::IdClock;
use crate::config::DelimitedFormat;
use crate::types::{Packet, PacketValue, SeriesKey};

pub fn extract(format: &DelimitedFormat, buffer: &mut Vec<u8>, clock: &mut IdClock) -> Vec<Packet> {
    let (segments, consumed) = format.packet_delimiters.split_terminated(buffer);

    let mut packets = Vec::with_capacity(segments.len());
    for raw in segments {
        match decode_segment(format, raw) {
            Some((id, value)) => packets.push(Packet::new(
                SeriesKey::Text(id),
                clock.mint(),
                PacketValue::Text(value),
            )),
            None => tracing::trace!("Dropped segment {:?}", String::from_utf8_lossy(raw)),
        }
    }

    buffer.drain(..consumed);
    packets
}

fn decode_segment(format: &DelimitedFormat, raw: &[u8]) -> Option<(String, String)> {
    let mut text = String::from_utf8_lossy(raw).into_owned();
    for ignored in format.ignore.iter().filter(|s| !s.is_empty()) {
        text = text.replace(ignored.as_str(), "");
    }

    let parts = format.data_delimiters.split(text.as_bytes());
    let [id, value] = parts.as_slice() else {
        return None;
    };
    if value.is_empty() {
        return None;
    }

    let id = String::from_utf8_lossy(id).into_owned();
    if !format.packet_ids.contains(&id) {
        return None;
    }
    Some((id, String::from_utf8_lossy(value).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Delimiters;

    fn format(ignore: &[&str]) -> DelimitedFormat {
        DelimitedFormat {
            packet_delimiters: Delimiters::new("packet_delimiters", &["\n".into(), "\t".into()])
                .unwrap(),
            data_delimiters: Delimiters::new("data_delimiters", &["=".into()]).unwrap(),
            packet_ids: vec!["output".into()],
            ignore: ignore.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn values(packets: &[Packet]) -> Vec<(String, String)> {
        packets
            .iter()
            .map(|p| (p.series.to_string(), p.value.to_string()))
            .collect()
    }

    #[test]
    fn test_reference_stream() {
        let mut buffer = b"sensor = 1\toutput = a\nsensor = 2\toutput = b\n".to_vec();
        let mut clock = IdClock::new();
        let packets = extract(&format(&["\r", " "]), &mut buffer, &mut clock);

        assert_eq!(
            values(&packets),
            vec![
                ("output".to_string(), "a".to_string()),
                ("output".to_string(), "b".to_string())
            ]
        );
        assert_eq!(packets[0].plaintext, "output: a");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_trailing_segment_stays_buffered() {
        let mut buffer = b"output=1\noutput=2".to_vec();
        let packets = extract(&format(&[]), &mut buffer, &mut IdClock::new());
        assert_eq!(packets.len(), 1);
        assert_eq!(buffer, b"output=2");
    }

    #[test]
    fn test_noise_is_dropped() {
        // wrong id, empty value, too many parts, no data delimiter
        let mut buffer = b"other=1\noutput=\noutput=1=2\noutput\noutput=ok\n".to_vec();
        let packets = extract(&format(&[]), &mut buffer, &mut IdClock::new());
        assert_eq!(values(&packets), vec![("output".to_string(), "ok".to_string())]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ignore_applies_before_split() {
        let mut buffer = b"out put = 4\r\n".to_vec();
        let packets = extract(&format(&["\r", " "]), &mut buffer, &mut IdClock::new());
        assert_eq!(values(&packets), vec![("output".to_string(), "4".to_string())]);
    }

    #[test]
    fn test_split_multibyte_character_survives() {
        let text = "output=é\n".as_bytes();
        let (head, tail) = text.split_at(8); // cuts inside 'é'
        let fmt = format(&[]);
        let mut clock = IdClock::new();
        let mut buffer = head.to_vec();
        assert!(extract(&fmt, &mut buffer, &mut clock).is_empty());
        buffer.extend_from_slice(tail);
        let packets = extract(&fmt, &mut buffer, &mut clock);
        assert_eq!(packets[0].value, PacketValue::from("é"));
    }
}
