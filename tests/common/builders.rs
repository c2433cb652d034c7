//! Test data builders for packet configs

use serde_json::{json, Value};
use serial_capture::PacketConfig;

/// Builder for JSON packet configs
pub struct PacketConfigBuilder {
    format: Value,
}

impl PacketConfigBuilder {
    /// Kind 0 with the given ids, `\n`/`\t` packet delimiters and `=` data delimiter
    pub fn delimited(ids: &[&str]) -> Self {
        Self {
            format: json!({
                "type": 0,
                "packet_delimiters": ["\n", "\t"],
                "data_delimiters": ["="],
                "packet_ids": ids,
            }),
        }
    }

    /// Kind 1 with `;` packet delimiter, `:` data delimiter and `id`/`data` specifiers
    pub fn paired(ids: &[&str]) -> Self {
        Self {
            format: json!({
                "type": 1,
                "packet_delimiters": [";"],
                "data_delimiters": [":"],
                "packet_ids": ids,
                "specifiers": ["id", "data"],
            }),
        }
    }

    /// Kind 2 with an id and a data field
    pub fn hex_frame(id_len: u32, data_len: u32, ids: &[&str]) -> Self {
        Self::frame(2, id_len, data_len, ids)
    }

    /// Kind 3 with an id and a data field
    pub fn bit_frame(id_len: u32, data_len: u32, ids: &[&str]) -> Self {
        Self::frame(3, id_len, data_len, ids)
    }

    fn frame(kind: u8, id_len: u32, data_len: u32, ids: &[&str]) -> Self {
        Self {
            format: json!({
                "type": kind,
                "header_order": ["ID", "DATA"],
                "header_len": [id_len, data_len],
                "packet_ids": ids,
            }),
        }
    }

    pub fn ignore(mut self, tokens: &[&str]) -> Self {
        self.format["ignore"] = json!(tokens);
        self
    }

    /// Attach a graph definition for `series`
    pub fn graph(mut self, series: &str, definition: Value) -> Self {
        self.format["graph_definitions"][series] = definition;
        self
    }

    pub fn json(self) -> Value {
        json!({ "packet_title": "test", "packet_format": self.format })
    }

    pub fn build(self) -> PacketConfig {
        PacketConfig::from_json_value(self.json()).expect("test packet config is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_kinds() {
        assert_eq!(PacketConfigBuilder::delimited(&["a"]).build().kind(), 0);
        assert_eq!(PacketConfigBuilder::paired(&["0x1"]).build().kind(), 1);
        assert_eq!(PacketConfigBuilder::hex_frame(3, 8, &["0x432"]).build().kind(), 2);
        assert_eq!(PacketConfigBuilder::bit_frame(4, 8, &["0b1"]).build().kind(), 3);
    }
}
