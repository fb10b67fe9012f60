//! NetAcuity Edge protocol
//!
//! Wire format for the UDP lookup service exposed by NetAcuity servers.
//! A query is a single datagram of `;`-terminated ASCII fields; the answer is a
//! datagram with a 4-byte header followed by a 25-field [`EdgeRecord`].
//!
//! ```rust
//! use netacuity_protocol::{decode_response, encode_response, EdgeQuery, EdgeRecord};
//!
//! let query = EdgeQuery::new(2, "1.2.3.4", "7A1F09").unwrap();
//! assert_eq!(query.encode(), b"4;2;1.2.3.4;5;1;7A1F09;");
//!
//! let answer = EdgeRecord {
//!     ip: query.address().to_string(),
//!     transaction_id: query.transaction_id().to_string(),
//!     ..Default::default()
//! };
//! let datagram = encode_response(&answer);
//! assert_eq!(decode_response(&datagram), Some(answer));
//! ```

mod codec;
mod error;
mod query;
mod record;

pub use codec::{decode_response, encode_response, API_5_INDICATOR, RESPONSE_HEADER_LEN};
pub use error::{Error, Result};
pub use query::{EdgeQuery, MAX_APP_ID, MAX_TRANSACTION_ID_LEN};
pub use record::{EdgeRecord, FIELD_NAMES, RECORD_FIELD_COUNT};

/// Feature id of the Edge database
pub const FEATURE_EDGE_DB: u8 = 4;

/// Protocol version spoken by this crate
pub const API_VERSION: i32 = 5;

/// Query type sent with every request
pub const API_TYPE: u8 = 1;

/// Separator (and terminator) of wire fields
pub const FIELD_SEPARATOR: char = ';';
