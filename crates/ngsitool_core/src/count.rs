//! Total-match counts, read from wherever each dialect reports them.
//!
//! Flat-JSON and linked-data brokers answer with a decimal response header.
//! Legacy brokers embed the total as free text (`"Count: 42"`) in the
//! `errorCode.details` field of the query envelope; only the exact
//! `Count: <digits>` form is accepted.

use serde::Deserialize;

use crate::client::BrokerResponse;
use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

pub const LEGACY_COUNT_PREFIX: &str = "Count: ";
const LEGACY_OK: &str = "200";

pub fn extract_count(dialect: Dialect, response: &BrokerResponse) -> MigrationResult<usize> {
    match dialect.count_header() {
        Some(header) => parse_count_header(dialect, header, response),
        None => legacy_body_count(response),
    }
}

pub fn parse_count_header(
    dialect: Dialect,
    header: &str,
    response: &BrokerResponse,
) -> MigrationResult<usize> {
    let endpoint = response.endpoint.as_str();
    let value = response.header(header).ok_or_else(|| {
        MigrationError::count(endpoint, dialect, format!("response has no {header} header"))
    })?;
    parse_decimal(value).ok_or_else(|| {
        MigrationError::count(endpoint, dialect, format!("{header} is not a count: {value:?}"))
    })
}

/// Parse the legacy `details` text. The value must be exactly `Count: `
/// followed by decimal digits and nothing else.
pub fn parse_legacy_count_details(details: &str) -> Option<usize> {
    details.strip_prefix(LEGACY_COUNT_PREFIX).and_then(parse_decimal)
}

/// The envelope status is checked before its details are read.
fn legacy_body_count(response: &BrokerResponse) -> MigrationResult<usize> {
    let endpoint = response.endpoint.as_str();
    let envelope: CountEnvelope = serde_json::from_slice(&response.body)
        .map_err(|error| MigrationError::decode_at(endpoint, "legacy query envelope", error))?;
    let Some(status) = envelope.error_code else {
        return Err(MigrationError::count(
            endpoint,
            Dialect::Legacy,
            "query envelope has no errorCode",
        ));
    };
    if status.code != LEGACY_OK {
        return Err(MigrationError::upstream_item(
            endpoint,
            status.code,
            status.reason_phrase,
        ));
    }
    let details = status.details.unwrap_or_default();
    parse_legacy_count_details(&details).ok_or_else(|| {
        MigrationError::count(
            endpoint,
            Dialect::Legacy,
            format!("errorCode.details {details:?} does not match `{LEGACY_COUNT_PREFIX}<digits>`"),
        )
    })
}

fn parse_decimal(value: &str) -> Option<usize> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[derive(Debug, Deserialize, Default)]
struct CountEnvelope {
    #[serde(rename = "errorCode", default)]
    error_code: Option<CountStatus>,
}

#[derive(Debug, Deserialize, Default)]
struct CountStatus {
    #[serde(default)]
    code: String,
    #[serde(rename = "reasonPhrase", default)]
    reason_phrase: String,
    #[serde(default)]
    details: Option<String>,
}
