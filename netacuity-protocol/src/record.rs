//! Edge record: the 25-field response to an Edge query

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::{API_VERSION, FIELD_SEPARATOR};

/// Number of fields in an Edge record
pub const RECORD_FIELD_COUNT: usize = 25;

/// Wire names of the record fields, in wire order
pub const FIELD_NAMES: [&str; RECORD_FIELD_COUNT] = [
    "apiVersion",
    "ip",
    "transactionId",
    "error",
    "country",
    "region",
    "city",
    "connectionSpeed",
    "metroCode",
    "latitude",
    "longitude",
    "postCode",
    "countryCode",
    "regionCode",
    "cityCode",
    "continentCode",
    "isoCountryCode",
    "internalCode",
    "areaCodes",
    "countryConfidence",
    "regionConfidence",
    "cityConfidence",
    "postCodeConfidence",
    "gmtOffset",
    "inDst",
];

/// A geo-IP lookup result returned by a NetAcuity server
///
/// Records are built from the ordered field list carried in a response with
/// [`EdgeRecord::from_fields`]. A field that is missing, or that does not parse
/// as the type of its position, takes the value of [`EdgeRecord::default`] at
/// that position. Explicit zeros and empty strings are kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    /// API version used to format this record
    pub api_version: i32,
    /// Address from the query
    pub ip: String,
    /// Transaction id from the query
    pub transaction_id: String,
    /// Server-side error text, empty on success
    pub error: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub connection_speed: String,
    /// US metro code
    pub metro_code: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub post_code: String,
    pub country_code: i32,
    pub region_code: i32,
    pub city_code: i32,
    pub continent_code: i32,
    /// ISO 3166 country code (two characters)
    pub iso_country_code: String,
    pub internal_code: i32,
    pub area_codes: String,
    /// Confidence values range from 0 to 5
    pub country_confidence: u8,
    pub region_confidence: u8,
    pub city_confidence: u8,
    pub post_code_confidence: u8,
    /// GMT offset of the local timezone, in hours
    pub gmt_offset: i32,
    /// "y" when the local timezone is in daylight saving time, "n" otherwise
    pub in_dst: String,
}

impl Default for EdgeRecord {
    fn default() -> Self {
        Self {
            api_version: API_VERSION,
            ip: String::new(),
            transaction_id: String::new(),
            error: String::new(),
            country: String::new(),
            region: String::new(),
            city: String::new(),
            connection_speed: String::new(),
            metro_code: 0,
            latitude: 0.0,
            longitude: 0.0,
            post_code: String::new(),
            country_code: 0,
            region_code: 0,
            city_code: 0,
            continent_code: 0,
            iso_country_code: String::new(),
            internal_code: 0,
            area_codes: String::new(),
            country_confidence: 0,
            region_confidence: 0,
            city_confidence: 0,
            post_code_confidence: 0,
            gmt_offset: 0,
            in_dst: "n".to_string(),
        }
    }
}

fn text_at<S: AsRef<str>>(fields: &[S], index: usize, default: String) -> String {
    match fields.get(index).map(AsRef::as_ref) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default,
    }
}

fn number_at<S: AsRef<str>, T: FromStr>(fields: &[S], index: usize, default: T) -> T {
    fields
        .get(index)
        .and_then(|value| value.as_ref().trim().parse().ok())
        .unwrap_or(default)
}

/// Like [`number_at`], but NaN and infinities fall back to the default so
/// records stay comparable
fn coordinate_at<S: AsRef<str>>(fields: &[S], index: usize, default: f64) -> f64 {
    let value = number_at(fields, index, default);
    if value.is_finite() {
        value
    } else {
        default
    }
}

impl EdgeRecord {
    /// Build a record from an ordered field list
    ///
    /// Extra trailing fields (such as the empty string left after the final
    /// separator) are ignored.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let d = Self::default();

        Self {
            api_version: number_at(fields, 0, d.api_version),
            ip: text_at(fields, 1, d.ip),
            transaction_id: text_at(fields, 2, d.transaction_id),
            error: text_at(fields, 3, d.error),
            country: text_at(fields, 4, d.country),
            region: text_at(fields, 5, d.region),
            city: text_at(fields, 6, d.city),
            connection_speed: text_at(fields, 7, d.connection_speed),
            metro_code: number_at(fields, 8, d.metro_code),
            latitude: coordinate_at(fields, 9, d.latitude),
            longitude: coordinate_at(fields, 10, d.longitude),
            post_code: text_at(fields, 11, d.post_code),
            country_code: number_at(fields, 12, d.country_code),
            region_code: number_at(fields, 13, d.region_code),
            city_code: number_at(fields, 14, d.city_code),
            continent_code: number_at(fields, 15, d.continent_code),
            iso_country_code: text_at(fields, 16, d.iso_country_code),
            internal_code: number_at(fields, 17, d.internal_code),
            area_codes: text_at(fields, 18, d.area_codes),
            country_confidence: number_at(fields, 19, d.country_confidence),
            region_confidence: number_at(fields, 20, d.region_confidence),
            city_confidence: number_at(fields, 21, d.city_confidence),
            post_code_confidence: number_at(fields, 22, d.post_code_confidence),
            gmt_offset: number_at(fields, 23, d.gmt_offset),
            in_dst: text_at(fields, 24, d.in_dst),
        }
    }

    /// Parse the `;`-separated wire text of a record
    pub fn parse(text: &str) -> Self {
        let fields: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
        Self::from_fields(&fields)
    }

    /// Whether the server reported an error for this lookup
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// All fields as `(wire name, value)` pairs, in wire order
    pub fn fields(&self) -> [(&'static str, String); RECORD_FIELD_COUNT] {
        let values = [
            self.api_version.to_string(),
            self.ip.clone(),
            self.transaction_id.clone(),
            self.error.clone(),
            self.country.clone(),
            self.region.clone(),
            self.city.clone(),
            self.connection_speed.clone(),
            self.metro_code.to_string(),
            self.latitude.to_string(),
            self.longitude.to_string(),
            self.post_code.clone(),
            self.country_code.to_string(),
            self.region_code.to_string(),
            self.city_code.to_string(),
            self.continent_code.to_string(),
            self.iso_country_code.clone(),
            self.internal_code.to_string(),
            self.area_codes.clone(),
            self.country_confidence.to_string(),
            self.region_confidence.to_string(),
            self.city_confidence.to_string(),
            self.post_code_confidence.to_string(),
            self.gmt_offset.to_string(),
            self.in_dst.clone(),
        ];

        let mut index = 0;
        values.map(|value| {
            let pair = (FIELD_NAMES[index], value);
            index += 1;
            pair
        })
    }

    /// Value of a single field by its wire name (e.g. `"city"`)
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}

/// Formats the record as the `;`-terminated field list a server sends
impl fmt::Display for EdgeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, value) in self.fields() {
            write!(f, "{}{}", value, FIELD_SEPARATOR)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> EdgeRecord {
        EdgeRecord {
            ip: "81.2.69.160".into(),
            transaction_id: "4F1C2A".into(),
            country: "gbr".into(),
            region: "eng".into(),
            city: "london".into(),
            connection_speed: "broadband".into(),
            metro_code: 826044,
            latitude: 51.5142,
            longitude: -0.0931,
            post_code: "ec4n".into(),
            country_code: 826,
            region_code: 44,
            city_code: 4782,
            continent_code: 5,
            iso_country_code: "gb".into(),
            internal_code: 3,
            area_codes: "020".into(),
            country_confidence: 5,
            region_confidence: 4,
            city_confidence: 3,
            post_code_confidence: 1,
            gmt_offset: 0,
            in_dst: "y".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_record() {
        let record = EdgeRecord::default();
        assert_eq!(record.api_version, 5);
        assert_eq!(record.in_dst, "n");
        assert!(record.ip.is_empty());
        assert_eq!(record.latitude, 0.0);
        assert!(!record.is_error());
    }

    #[test]
    fn test_empty_fields_give_default() {
        let empty: [&str; 0] = [];
        assert_eq!(EdgeRecord::from_fields(&empty), EdgeRecord::default());
    }

    #[test]
    fn test_construction_is_deterministic() {
        let fields = ["5", "1.2.3.4", "TX", "", "usa", "ca", "san jose"];
        assert_eq!(EdgeRecord::from_fields(&fields), EdgeRecord::from_fields(&fields));
    }

    #[test]
    fn test_wire_text_round_trip() {
        let record = sample_record();
        assert_eq!(EdgeRecord::parse(&record.to_string()), record);

        let default = EdgeRecord::default();
        assert_eq!(EdgeRecord::parse(&default.to_string()), default);
    }

    #[test]
    fn test_default_wire_text() {
        assert_eq!(
            EdgeRecord::default().to_string(),
            "5;;;;;;;;0;0;0;;0;0;0;0;;0;;0;0;0;0;0;n;"
        );
    }

    #[test]
    fn test_explicit_zero_preserved() {
        let mut fields: Vec<String> = EdgeRecord::default()
            .fields()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        fields[0] = "0".into();
        fields[23] = "-5".into();

        let record = EdgeRecord::from_fields(&fields);
        assert_eq!(record.api_version, 0);
        assert_eq!(record.gmt_offset, -5);
    }

    #[test]
    fn test_unparseable_number_falls_back() {
        let record = EdgeRecord::from_fields(&["five", "1.2.3.4", "", "", "", "", "", "", "x"]);
        assert_eq!(record.api_version, 5);
        assert_eq!(record.metro_code, 0);
        assert_eq!(record.ip, "1.2.3.4");
    }

    #[test]
    fn test_short_list_uses_defaults_for_missing() {
        let record = EdgeRecord::from_fields(&["5", "1.2.3.4", "TX"]);
        assert_eq!(record.transaction_id, "TX");
        assert_eq!(record.in_dst, "n");
        assert_eq!(record.city, "");
    }

    #[test]
    fn test_field_lookup() {
        let record = sample_record();
        assert_eq!(record.field("city").as_deref(), Some("london"));
        assert_eq!(record.field("countryCode").as_deref(), Some("826"));
        assert_eq!(record.field("inDst").as_deref(), Some("y"));
        assert_eq!(record.field("nope"), None);
    }

    #[test]
    fn test_field_names_in_order() {
        let record = sample_record();
        let names: Vec<&str> = record.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, FIELD_NAMES.to_vec());
    }

    #[test]
    fn test_equality_detects_any_field() {
        let a = sample_record();
        let mut b = a.clone();
        assert_eq!(a, b);

        b.post_code_confidence = 2;
        assert_ne!(a, b);
    }

    #[test]
    fn test_error_flag() {
        let record = EdgeRecord::from_fields(&["5", "1.2.3.4", "TX", "unknown ip"]);
        assert!(record.is_error());
        assert_eq!(record.error, "unknown ip");
    }

    #[test]
    fn test_non_finite_coordinates_use_default() {
        let mut fields = vec![""; RECORD_FIELD_COUNT];
        fields[9] = "nan";
        fields[10] = "-inf";

        let a = EdgeRecord::from_fields(&fields[..]);
        let b = EdgeRecord::from_fields(&fields[..]);
        assert_eq!(a.latitude, 0.0);
        assert_eq!(a.longitude, 0.0);
        assert_eq!(a, b);
    }
}
