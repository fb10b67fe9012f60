//! Edge database query encoding and parsing

use std::fmt;

use crate::{Error, Result, API_TYPE, API_VERSION, FEATURE_EDGE_DB, FIELD_SEPARATOR};

/// Maximum length of a transaction id
pub const MAX_TRANSACTION_ID_LEN: usize = 64;

/// Largest application id accepted by NetAcuity servers
pub const MAX_APP_ID: u8 = 127;

/// Number of fields in an encoded query
const QUERY_FIELD_COUNT: usize = 6;

/// A lookup request for the Edge database
///
/// The feature database id, API version and API type are protocol constants and
/// are filled in when the query is encoded:
///
/// ```text
/// featureDbId;apiId;address;apiVersion;apiType;transactionId;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeQuery {
    app_id: u8,
    address: String,
    transaction_id: String,
}

impl EdgeQuery {
    /// Create a new query
    ///
    /// Fails if `app_id` is above 127, the transaction id is longer than
    /// [`MAX_TRANSACTION_ID_LEN`], or either string contains the field separator.
    pub fn new(
        app_id: u8,
        address: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Result<Self> {
        let address = address.into();
        let transaction_id = transaction_id.into();

        if app_id > MAX_APP_ID {
            return Err(Error::InvalidQuery(format!(
                "app id {} is out of range (0-{})",
                app_id, MAX_APP_ID
            )));
        }

        if transaction_id.len() > MAX_TRANSACTION_ID_LEN {
            return Err(Error::InvalidQuery(format!(
                "transaction id is {} characters long (max {})",
                transaction_id.len(),
                MAX_TRANSACTION_ID_LEN
            )));
        }

        if address.contains(FIELD_SEPARATOR) || transaction_id.contains(FIELD_SEPARATOR) {
            return Err(Error::InvalidQuery(format!(
                "query fields must not contain '{}'",
                FIELD_SEPARATOR
            )));
        }

        Ok(Self {
            app_id,
            address,
            transaction_id,
        })
    }

    /// Application id used for NetAcuity usage reporting
    pub fn app_id(&self) -> u8 {
        self.app_id
    }

    /// Address being looked up
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Correlation id echoed back in the response
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Encode the query into its datagram payload
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse an encoded query
    ///
    /// Only the app id (index 1), address (index 2) and transaction id (index 5)
    /// are extracted; the constant fields are not checked. This is the server side
    /// of the exchange and is used by test doubles.
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();

        if fields.len() < QUERY_FIELD_COUNT {
            return Err(Error::MalformedQuery {
                expected: QUERY_FIELD_COUNT,
                actual: fields.len(),
            });
        }

        let app_id = fields[1]
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::MalformedField {
                field: "apiId",
                value: fields[1].to_string(),
            })?;

        Self::new(app_id, fields[2], fields[5])
    }
}

impl fmt::Display for EdgeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{feature}{sep}{app}{sep}{addr}{sep}{version}{sep}{kind}{sep}{txid}{sep}",
            feature = FEATURE_EDGE_DB,
            app = self.app_id,
            addr = self.address,
            version = API_VERSION,
            kind = API_TYPE,
            txid = self.transaction_id,
            sep = FIELD_SEPARATOR,
        )
    }
}
