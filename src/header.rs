//! Bracketed header parsing and year range extraction.
//!
//! Header lines carry `[Key=Value]` groups, e.g.
//! `[Boxes=   67420] [Years=1991-2000] [Multi=    0.1000] [Missing=-999]`.
//! Only the `Years` value is structural; the other fields are kept as
//! metadata.

use crate::constants::{
    HEADER_GROUP_CLOSE, HEADER_GROUP_OPEN, HEADER_KEY_VALUE_SEPARATOR, YEARS_KEY, YEARS_SKIP,
};
use crate::error::{GridError, Result};
use crate::models::YearRange;
use crate::scanner::LineScanner;
use std::collections::BTreeMap;
use tracing::debug;

/// Key/value pairs of one header line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: BTreeMap<String, String>,
}

impl HeaderFields {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Year range from the `Years` field, `None` if the field is absent
    pub fn years(&self) -> Result<Option<YearRange>> {
        self.get(YEARS_KEY).map(parse_years).transpose()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.fields
    }
}

/// Collect every `[Key=Value]` group of a line.
///
/// Keys and values are trimmed and the last occurrence of a key wins. Groups
/// without `=` are ignored and an unterminated `[` ends the scan, so lines
/// with no complete groups give an empty result.
pub fn parse_header_fields(line: &str) -> HeaderFields {
    let mut fields = BTreeMap::new();
    let mut scanner = LineScanner::new(line);

    while scanner.skip_past(HEADER_GROUP_OPEN) {
        let Some(group) = scanner.scan_up_to(HEADER_GROUP_CLOSE) else {
            break;
        };
        scanner.skip_past(HEADER_GROUP_CLOSE);

        let mut group_scanner = LineScanner::new(group);
        let Some(key) = group_scanner.scan_up_to(HEADER_KEY_VALUE_SEPARATOR) else {
            debug!("Ignoring header group without '=': [{}]", group);
            continue;
        };
        group_scanner.skip_past(HEADER_KEY_VALUE_SEPARATOR);
        let value = group_scanner.remainder();

        fields.insert(key.trim().to_string(), value.trim().to_string());
    }

    HeaderFields { fields }
}

/// Parse a `Years` value such as `1991-2000` into a year range
pub fn parse_years(value: &str) -> Result<YearRange> {
    let scanner = LineScanner::with_skip(value, YEARS_SKIP);
    let mut years = scanner.integers();

    let (Some(from), Some(to)) = (years.next(), years.next()) else {
        return Err(GridError::parse_years(value, "expected two years"));
    };

    let narrow = |year: i64| {
        i16::try_from(year)
            .map(i32::from)
            .map_err(|_| GridError::parse_years(value, format!("year {year} out of range")))
    };

    YearRange::new(narrow(from)?, narrow(to)?)
}
