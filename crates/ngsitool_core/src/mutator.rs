use serde::Serialize;
use tracing::debug;

use crate::client::{BrokerClient, BrokerRequest, CONTENT_TYPE_JSON, CONTENT_TYPE_LD_JSON};
use crate::codec::{LegacyAction, check_legacy_update_response, encode_legacy_mutation};
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::{MigrationError, MigrationResult};

const MULTI_STATUS: u16 = 207;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationVerb {
    Append,
    Delete,
}

impl MutationVerb {
    fn flat_json_action(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Delete => "delete",
        }
    }

    fn legacy_action(self) -> LegacyAction {
        match self {
            Self::Append => LegacyAction::Append,
            Self::Delete => LegacyAction::Delete,
        }
    }
}

/// Payload of one batch call. Linked-data deletes take bare identifiers;
/// every other call takes full entities.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Entities(Vec<Entity>),
    Identifiers(Vec<String>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Self::Entities(entities) => entities.len(),
            Self::Identifiers(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issue one batch mutation against `client` and return how many items the
/// broker accepted.
pub fn apply<C: BrokerClient + ?Sized>(
    client: &mut C,
    verb: MutationVerb,
    batch: Batch,
) -> MigrationResult<usize> {
    let dialect = client.profile().dialect;
    let size = batch.len();
    let applied = match (dialect, batch) {
        (Dialect::FlatJson, Batch::Entities(entities)) => {
            apply_flat_json(client, verb, &entities)?
        }
        (Dialect::LinkedData, Batch::Entities(entities)) if verb == MutationVerb::Append => {
            apply_linked_data_create(client, &entities)?
        }
        (Dialect::LinkedData, Batch::Identifiers(ids)) if verb == MutationVerb::Delete => {
            apply_linked_data_delete(client, &ids)?
        }
        (Dialect::Legacy, Batch::Entities(entities)) => apply_legacy(client, verb, &entities)?,
        (dialect, batch) => {
            return Err(MigrationError::InvalidJob(format!(
                "{dialect} {verb:?} cannot take a batch of {}",
                match batch {
                    Batch::Entities(_) => "entities",
                    Batch::Identifiers(_) => "identifiers",
                }
            )));
        }
    };
    debug!(broker = %client.profile().name, %dialect, ?verb, size, applied, "batch applied");
    Ok(applied)
}

fn apply_flat_json<C: BrokerClient + ?Sized>(
    client: &mut C,
    verb: MutationVerb,
    entities: &[Entity],
) -> MigrationResult<usize> {
    #[derive(Serialize)]
    struct OpUpdate<'a> {
        #[serde(rename = "actionType")]
        action_type: &'a str,
        entities: &'a [Entity],
    }

    let body = serde_json::to_vec(&OpUpdate {
        action_type: verb.flat_json_action(),
        entities,
    })
    .map_err(|error| MigrationError::decode("flat-json op/update request", error))?;
    let path = format!("{}/op/update", Dialect::FlatJson.base_path());
    client
        .execute(BrokerRequest::post(path, CONTENT_TYPE_JSON, body))?
        .ensure_status(is_2xx)?;
    Ok(entities.len())
}

fn apply_linked_data_create<C: BrokerClient + ?Sized>(
    client: &mut C,
    entities: &[Entity],
) -> MigrationResult<usize> {
    let content_type = if entities.iter().any(|entity| entity.get("@context").is_some()) {
        CONTENT_TYPE_LD_JSON
    } else {
        CONTENT_TYPE_JSON
    };
    let body = serde_json::to_vec(entities)
        .map_err(|error| MigrationError::decode("linked-data create request", error))?;
    let path = format!("{}/entityOperations/create", Dialect::LinkedData.base_path());
    client
        .execute(BrokerRequest::post(path, content_type, body))?
        .ensure_status(is_complete_2xx)?;
    Ok(entities.len())
}

fn apply_linked_data_delete<C: BrokerClient + ?Sized>(
    client: &mut C,
    ids: &[String],
) -> MigrationResult<usize> {
    let body = serde_json::to_vec(ids)
        .map_err(|error| MigrationError::decode("linked-data delete request", error))?;
    let path = format!("{}/entityOperations/delete", Dialect::LinkedData.base_path());
    client
        .execute(BrokerRequest::post(path, CONTENT_TYPE_JSON, body))?
        .ensure_status(is_complete_2xx)?;
    Ok(ids.len())
}

fn apply_legacy<C: BrokerClient + ?Sized>(
    client: &mut C,
    verb: MutationVerb,
    entities: &[Entity],
) -> MigrationResult<usize> {
    let body = encode_legacy_mutation(entities, verb.legacy_action())?;
    let path = format!("{}/updateContext", Dialect::Legacy.base_path());
    let response = client
        .execute(BrokerRequest::post(path, CONTENT_TYPE_JSON, body))?
        .ensure_status(|status| status == 200)?;
    check_legacy_update_response(&response)
}

fn is_2xx(status: u16) -> bool {
    (200..300).contains(&status)
}

// 207 reports a partially applied batch.
fn is_complete_2xx(status: u16) -> bool {
    is_2xx(status) && status != MULTI_STATUS
}
