//! Kind 1: alternating id and data segments
//!
//! Segments are cut on the packet delimiters like kind 0, then each is split
//! on the data delimiters into `[specifier, value]`. The stream is expected
//! to alternate `id:<series>` and `data:<value>`, and a resynchronisation
//! pass pairs them back up after noise:
//!
//! | id candidate | data candidate | action |
//! |---|---|---|
//! | bad | bad | drop the id candidate, retry with the data candidate as id |
//! | bad | good | drop both |
//! | good | bad | drop the id candidate, retry with the data candidate as id |
//! | good | good | accept the pair |
//!
//! A single good id left over at the end is kept buffered because its data
//! segment may not have arrived yet. It is written back ahead of the
//! unterminated tail, followed by the first packet delimiter so the next
//! pass cuts it out again.

use super::IdClock;
use crate::config::{Delimiters, PairedFormat};
use crate::types::{Packet, PacketValue, SeriesKey};
use std::collections::VecDeque;

/// One delimited segment split into its parts
struct Candidate<'a> {
    raw: &'a [u8],
    parts: Vec<String>,
}

impl<'a> Candidate<'a> {
    fn new(raw: &'a [u8], data_delimiters: &Delimiters) -> Self {
        let text = String::from_utf8_lossy(raw);
        let parts = data_delimiters
            .split(text.as_bytes())
            .into_iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect();
        Self { raw, parts }
    }

    /// Exactly `[specifier, non-empty value]`
    fn is(&self, specifier: &str) -> bool {
        matches!(self.parts.as_slice(), [s, v] if s == specifier && !v.is_empty())
    }

    fn value(&self) -> &str {
        self.parts.get(1).map(String::as_str).unwrap_or_default()
    }
}

pub fn extract(format: &PairedFormat, buffer: &mut Vec<u8>, clock: &mut IdClock) -> Vec<Packet> {
    let (segments, consumed) = format.packet_delimiters.split_terminated(buffer);
    let mut queue: VecDeque<Candidate<'_>> = segments
        .into_iter()
        .map(|raw| Candidate::new(raw, &format.data_delimiters))
        .collect();

    let mut pairs = Vec::new();
    let mut pending = None;
    while let Some(id) = queue.pop_front() {
        let Some(data) = queue.pop_front() else {
            if id.is(&format.id_specifier) {
                pending = Some(id);
            } else {
                tracing::trace!("Dropped unpaired segment {:?}", id.parts);
            }
            break;
        };

        match (id.is(&format.id_specifier), data.is(&format.data_specifier)) {
            (true, true) => pairs.push((id, data)),
            (false, true) => {
                tracing::trace!("Dropped pair {:?} {:?}", id.parts, data.parts);
            }
            (_, false) => {
                tracing::trace!("Dropped segment {:?}, resynchronising", id.parts);
                queue.push_front(data);
            }
        }
    }

    let packets = pairs
        .into_iter()
        .filter(|(id, _)| format.packet_ids.iter().any(|p| p == id.value()))
        .map(|(id, data)| {
            Packet::new(
                SeriesKey::text(id.value()),
                clock.mint(),
                PacketValue::from(data.value()),
            )
        })
        .collect();

    let mut rest = Vec::new();
    if let Some(fragment) = pending {
        rest.extend_from_slice(fragment.raw);
        rest.extend_from_slice(format.packet_delimiters.first().as_bytes());
    }
    rest.extend_from_slice(&buffer[consumed..]);
    *buffer = rest;

    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> PairedFormat {
        PairedFormat {
            packet_delimiters: Delimiters::new("packet_delimiters", &[";".into()]).unwrap(),
            data_delimiters: Delimiters::new("data_delimiters", &[":".into()]).unwrap(),
            packet_ids: vec!["0x632".into(), "0x45".into()],
            id_specifier: "id".into(),
            data_specifier: "data".into(),
        }
    }

    fn run(buffer: &mut Vec<u8>, clock: &mut IdClock) -> Vec<(String, String)> {
        extract(&format(), buffer, clock)
            .into_iter()
            .map(|p| (p.series.to_string(), p.value.to_string()))
            .collect()
    }

    fn pair(series: &str, value: &str) -> (String, String) {
        (series.to_string(), value.to_string())
    }

    #[test]
    fn test_reference_stream_with_pending_id() {
        let mut clock = IdClock::new();
        let mut buffer = b"id:0x632;data:0x88;id:0x632;data:0xbb;id:0x45;".to_vec();

        let packets = run(&mut buffer, &mut clock);
        assert_eq!(packets, vec![pair("0x632", "0x88"), pair("0x632", "0xbb")]);
        assert_eq!(buffer, b"id:0x45;");

        buffer.extend_from_slice(b"data:0xff;");
        let packets = run(&mut buffer, &mut clock);
        assert_eq!(packets, vec![pair("0x45", "0xff")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pending_id_kept_ahead_of_tail() {
        let mut buffer = b"id:0x45;da".to_vec();
        assert!(run(&mut buffer, &mut IdClock::new()).is_empty());
        assert_eq!(buffer, b"id:0x45;da");

        buffer.extend_from_slice(b"ta:0x01;");
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x45", "0x01")]);
    }

    #[test]
    fn test_garbage_before_id_resynchronises() {
        // bad/bad: garbage dropped, id retried
        let mut buffer = b"garbage;id:0x632;data:0x01;".to_vec();
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x632", "0x01")]);
    }

    #[test]
    fn test_data_data_dropped() {
        // bad/good: both dropped
        let mut buffer = b"data:0x01;data:0x02;id:0x632;data:0x03;".to_vec();
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x632", "0x03")]);
    }

    #[test]
    fn test_id_id_keeps_second() {
        // good/bad: first id dropped, second id pairs with following data
        let mut buffer = b"id:0x45;id:0x632;data:0x07;".to_vec();
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x632", "0x07")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unknown_series_filtered() {
        let mut buffer = b"id:0x999;data:0x01;id:0x45;data:0x02;".to_vec();
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x45", "0x02")]);
    }

    #[test]
    fn test_empty_data_value_is_bad() {
        let mut buffer = b"id:0x45;data:;id:0x45;data:0x09;".to_vec();
        let packets = run(&mut buffer, &mut IdClock::new());
        assert_eq!(packets, vec![pair("0x45", "0x09")]);
    }

    #[test]
    fn test_leftover_data_segment_is_dropped() {
        let mut buffer = b"data:0x01;".to_vec();
        assert!(run(&mut buffer, &mut IdClock::new()).is_empty());
        assert!(buffer.is_empty());
    }
}
