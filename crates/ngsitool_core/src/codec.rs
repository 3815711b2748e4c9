use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::BrokerResponse;
use crate::dialect::Dialect;
use crate::entity::{ContextElement, DialectRecord, Entity};
use crate::error::{MigrationError, MigrationResult};

const LEGACY_OK: &str = "200";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyAction {
    Append,
    Delete,
}

impl LegacyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "APPEND",
            Self::Delete => "DELETE",
        }
    }
}

/// Decode one fetched page into canonical entities, in wire order.
pub fn decode_page(
    dialect: Dialect,
    response: &BrokerResponse,
    limit: usize,
) -> MigrationResult<Vec<Entity>> {
    let endpoint = response.endpoint.as_str();
    let entities = match dialect {
        Dialect::Legacy => decode_legacy_query(endpoint, &response.body)?,
        Dialect::FlatJson | Dialect::LinkedData => {
            decode_entity_array(dialect, endpoint, &response.body)?
        }
    };
    if entities.len() > limit {
        return Err(MigrationError::decode_at(
            endpoint,
            format!("{dialect} page"),
            format!("page holds {} entities, limit is {limit}", entities.len()),
        ));
    }
    Ok(entities)
}

fn decode_entity_array(
    dialect: Dialect,
    endpoint: &str,
    body: &[u8],
) -> MigrationResult<Vec<Entity>> {
    let items: Vec<Value> = serde_json::from_slice(body).map_err(|error| {
        MigrationError::decode_at(endpoint, format!("{dialect} entity list"), error)
    })?;
    items
        .into_iter()
        .map(|item| {
            DialectRecord::from_value(dialect, item)
                .and_then(DialectRecord::into_entity)
                .map_err(|error| error.at(endpoint))
        })
        .collect()
}

fn decode_legacy_query(endpoint: &str, body: &[u8]) -> MigrationResult<Vec<Entity>> {
    let envelope: LegacyEnvelope = serde_json::from_slice(body)
        .map_err(|error| MigrationError::decode_at(endpoint, "legacy query response", error))?;

    let status = envelope.error_code.unwrap_or_default();
    if status.code != LEGACY_OK {
        return Err(MigrationError::upstream_item(
            endpoint,
            status.code,
            status.reason_phrase,
        ));
    }
    ensure_items_ok(endpoint, &envelope.context_responses)?;

    envelope
        .context_responses
        .into_iter()
        .map(|item| {
            DialectRecord::Legacy(item.context_element)
                .into_entity()
                .map_err(|error| error.at(endpoint))
        })
        .collect()
}

/// Re-nest canonical entities into a legacy `updateContext` request body.
pub fn encode_legacy_mutation(entities: &[Entity], action: LegacyAction) -> MigrationResult<Vec<u8>> {
    let context_elements = entities
        .iter()
        .cloned()
        .map(ContextElement::try_from)
        .collect::<MigrationResult<Vec<_>>>()?;
    let request = UpdateContextRequest {
        context_elements,
        update_action: action.as_str().to_string(),
    };
    serde_json::to_vec(&request)
        .map_err(|error| MigrationError::decode("legacy update request", error))
}

/// Check a legacy `updateContext` response and return how many items it
/// acknowledged. Any item other than `"200"` fails the whole batch.
pub fn check_legacy_update_response(response: &BrokerResponse) -> MigrationResult<usize> {
    let endpoint = response.endpoint.as_str();
    let envelope: LegacyEnvelope = serde_json::from_slice(&response.body)
        .map_err(|error| MigrationError::decode_at(endpoint, "legacy update response", error))?;

    if let Some(status) = envelope.error_code
        && !status.code.is_empty()
    {
        let reason_phrase = match status.details.as_deref() {
            Some(details) if !details.is_empty() => {
                format!("{} {details}", status.reason_phrase)
            }
            _ => status.reason_phrase,
        };
        return Err(MigrationError::upstream_item(
            endpoint,
            status.code,
            reason_phrase,
        ));
    }
    ensure_items_ok(endpoint, &envelope.context_responses)?;
    Ok(envelope.context_responses.len())
}

fn ensure_items_ok(endpoint: &str, items: &[ContextResponse]) -> MigrationResult<()> {
    match items
        .iter()
        .find(|item| item.status_code.code != LEGACY_OK)
    {
        Some(item) => Err(MigrationError::upstream_item(
            endpoint,
            item.status_code.code.clone(),
            item.status_code.reason_phrase.clone(),
        )),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
struct LegacyEnvelope {
    #[serde(rename = "contextResponses", default)]
    context_responses: Vec<ContextResponse>,
    #[serde(rename = "errorCode", default)]
    error_code: Option<LegacyStatus>,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(rename = "contextElement")]
    context_element: ContextElement,
    #[serde(rename = "statusCode", default)]
    status_code: LegacyStatus,
}

#[derive(Debug, Deserialize, Default)]
struct LegacyStatus {
    #[serde(default)]
    code: String,
    #[serde(rename = "reasonPhrase", default)]
    reason_phrase: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateContextRequest {
    #[serde(rename = "contextElements")]
    context_elements: Vec<ContextElement>,
    #[serde(rename = "updateAction")]
    update_action: String,
}
