//! Response datagram framing
//!
//! ```text
//! +--------+--------+--------+--------+---------------------------------+
//! | Byte 0 | Byte 1 | Byte 2 | Byte 3 | Byte 4 ...                      |
//! +--------+--------+--------+--------+---------------------------------+
//! |  Size (ignored) |  Indicator (BE) | ASCII record, ';' terminated    |
//! +--------+--------+--------+--------+---------------------------------+
//! ```
//!
//! Requests carry no header: the datagram is the encoded [`EdgeQuery`](crate::EdgeQuery).

use crate::EdgeRecord;

/// Indicator marking a response in API version 5 format
pub const API_5_INDICATOR: u16 = 32767;

/// Length of the response header (size + indicator)
pub const RESPONSE_HEADER_LEN: usize = 4;

/// Decode a response datagram into a record
///
/// Returns `None` when the datagram is too short or does not carry the
/// version 5 indicator. Such datagrams are dropped by the client, so the request
/// they might have answered runs into its timeout instead.
pub fn decode_response(datagram: &[u8]) -> Option<EdgeRecord> {
    if datagram.len() < RESPONSE_HEADER_LEN {
        return None;
    }

    let indicator = u16::from_be_bytes([datagram[2], datagram[3]]);
    if indicator != API_5_INDICATOR {
        return None;
    }

    let text = String::from_utf8_lossy(&datagram[RESPONSE_HEADER_LEN..]);
    Some(EdgeRecord::parse(&text))
}

/// Encode a record as a server response datagram
pub fn encode_response(record: &EdgeRecord) -> Vec<u8> {
    let body = record.to_string();
    let size = u16::try_from(body.len()).unwrap_or(u16::MAX);

    let mut datagram = Vec::with_capacity(RESPONSE_HEADER_LEN + body.len());
    datagram.extend_from_slice(&size.to_be_bytes());
    datagram.extend_from_slice(&API_5_INDICATOR.to_be_bytes());
    datagram.extend_from_slice(body.as_bytes());
    datagram
}
