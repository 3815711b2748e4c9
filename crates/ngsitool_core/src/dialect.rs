use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const FLAT_JSON_COUNT_HEADER: &str = "fiware-total-count";
pub const LINKED_DATA_COUNT_HEADER: &str = "ngsild-results-count";

/// Wire protocol spoken by a context broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Legacy,
    FlatJson,
    LinkedData,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::FlatJson => "flat-json",
            Self::LinkedData => "linked-data",
        }
    }

    /// Path prefix every request of this dialect is rooted under.
    pub fn base_path(self) -> &'static str {
        match self {
            Self::Legacy => "/v1",
            Self::FlatJson => "/v2",
            Self::LinkedData => "/ngsi-ld/v1",
        }
    }

    /// Response header carrying the total match count, when the dialect uses one.
    pub fn count_header(self) -> Option<&'static str> {
        match self {
            Self::Legacy => None,
            Self::FlatJson => Some(FLAT_JSON_COUNT_HEADER),
            Self::LinkedData => Some(LINKED_DATA_COUNT_HEADER),
        }
    }

    /// Legacy brokers share a host with their flat-JSON API.
    pub fn uses_service_path(self) -> bool {
        matches!(self, Self::Legacy | Self::FlatJson)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" | "v1" | "ngsi-v1" => Ok(Self::Legacy),
            "flat-json" | "v2" | "ngsi-v2" => Ok(Self::FlatJson),
            "linked-data" | "ld" | "ngsi-ld" => Ok(Self::LinkedData),
            other => Err(format!(
                "unknown dialect `{other}` (expected legacy, flat-json or linked-data)"
            )),
        }
    }
}
