use std::collections::{BTreeMap, VecDeque};

use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::client::{BrokerClient, BrokerProfile, BrokerRequest, BrokerResponse};
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::{MigrationError, MigrationResult};

/// Endpoint carried by responses built outside a [`ScriptedBroker`].
pub(crate) const TEST_ENDPOINT: &str = "GET http://broker.test/v2/entities";

/// In-memory broker answering from a queue and recording every request.
pub(crate) struct ScriptedBroker {
    profile: BrokerProfile,
    responses: VecDeque<MigrationResult<BrokerResponse>>,
    pub(crate) requests: Vec<BrokerRequest>,
}

impl ScriptedBroker {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self::with_profile(BrokerProfile::new(
            dialect.as_str(),
            format!("http://{}.test", dialect.as_str()),
            dialect,
        ))
    }

    pub(crate) fn with_profile(profile: BrokerProfile) -> Self {
        Self {
            profile,
            responses: VecDeque::new(),
            requests: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, response: BrokerResponse) {
        self.responses.push_back(Ok(response));
    }

    pub(crate) fn push_error(&mut self, error: MigrationError) {
        self.responses.push_back(Err(error));
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<&BrokerRequest> {
        self.requests
            .iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

impl BrokerClient for ScriptedBroker {
    fn profile(&self) -> &BrokerProfile {
        &self.profile
    }

    fn execute(&mut self, request: BrokerRequest) -> MigrationResult<BrokerResponse> {
        let endpoint = format!("{} {}{}", request.method.as_str(), self.profile.url, request.path);
        self.requests.push(request);
        let mut response = self
            .responses
            .pop_front()
            .unwrap_or_else(|| {
                Err(MigrationError::Transport {
                    endpoint: endpoint.clone(),
                    message: "no scripted response left".to_string(),
                })
            })?;
        response.endpoint = endpoint;
        Ok(response)
    }

    fn request_count(&self) -> usize {
        self.requests.len()
    }
}

pub(crate) fn status_response(status: u16) -> BrokerResponse {
    BrokerResponse {
        endpoint: TEST_ENDPOINT.to_string(),
        status,
        reason: StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        headers: BTreeMap::new(),
        body: Vec::new(),
    }
}

pub(crate) fn json_response(status: u16, body: Value) -> BrokerResponse {
    let mut response = status_response(status);
    response.body = serde_json::to_vec(&body).expect("serialize body");
    response
}

pub(crate) fn response_with_count(
    dialect: Dialect,
    status: u16,
    count: &str,
    body: Value,
) -> BrokerResponse {
    let mut response = json_response(status, body);
    if let Some(header) = dialect.count_header() {
        response.headers.insert(header.to_string(), count.to_string());
    }
    response
}

/// Entity listing page: `count` in the dialect's header, ids `prefix{n}` for
/// every `n` in `ids`.
pub(crate) fn page(
    dialect: Dialect,
    count: usize,
    ids: impl IntoIterator<Item = usize>,
) -> BrokerResponse {
    let items: Vec<Value> = ids
        .into_iter()
        .map(|n| {
            json!({
                "id": format!("urn:ngsi-ld:Room:{n}"),
                "type": "Room",
                "temperature": {"type": "Number", "value": n}
            })
        })
        .collect();
    response_with_count(dialect, 200, &count.to_string(), Value::Array(items))
}

pub(crate) fn entity(id: &str, entity_type: &str) -> Entity {
    let value = json!({
        "id": id,
        "type": entity_type,
        "temperature": {"type": "Number", "value": 20}
    });
    match value {
        Value::Object(map) => Entity::from_map(map).expect("entity"),
        _ => unreachable!(),
    }
}

pub(crate) fn legacy_item(id: &str, code: &str) -> Value {
    json!({
        "contextElement": {
            "type": "Room",
            "isPattern": "false",
            "id": id,
            "attributes": [
                {"name": "temperature", "type": "float", "value": "23"},
                {"name": "pressure", "type": "integer", "value": "720"}
            ]
        },
        "statusCode": {"code": code, "reasonPhrase": if code == "200" { "OK" } else { "Bad Request" }}
    })
}

pub(crate) fn legacy_query_body(code: &str, details: &str, items: Vec<Value>) -> Value {
    json!({
        "contextResponses": items,
        "errorCode": {"code": code, "reasonPhrase": "OK", "details": details}
    })
}
