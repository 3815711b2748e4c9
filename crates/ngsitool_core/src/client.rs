use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::{Method, Url};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};

pub const HEADER_FIWARE_SERVICE: &str = "Fiware-Service";
pub const HEADER_FIWARE_SERVICE_PATH: &str = "Fiware-ServicePath";
pub const HEADER_NGSILD_TENANT: &str = "NGSILD-Tenant";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_LD_JSON: &str = "application/ld+json";
pub const HEADER_LINK: &str = "Link";

/// `Link` header value pointing a linked-data broker at a JSON-LD `@context`.
pub fn context_link(context: &str) -> String {
    format!(
        "<{context}>; rel=\"http://www.w3.org/ns/json-ld#context\"; type=\"{CONTENT_TYPE_LD_JSON}\""
    )
}

/// Connection details for one broker, already resolved from config and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerProfile {
    pub name: String,
    pub url: String,
    pub dialect: Dialect,
    pub tenant: Option<String>,
    pub scope: Option<String>,
    pub token: Option<String>,
}

impl BrokerProfile {
    pub fn new(name: impl Into<String>, url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            dialect,
            tenant: None,
            scope: None,
            token: None,
        }
    }

    /// Tenant and service-path headers sent with every request.
    pub fn scoping_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if self.dialect.uses_service_path() {
            if let Some(tenant) = non_empty(self.tenant.as_deref()) {
                headers.push((HEADER_FIWARE_SERVICE.to_string(), tenant.to_string()));
            }
            let scope = non_empty(self.scope.as_deref()).unwrap_or("/");
            headers.push((HEADER_FIWARE_SERVICE_PATH.to_string(), scope.to_string()));
        } else if let Some(tenant) = non_empty(self.tenant.as_deref()) {
            headers.push((HEADER_NGSILD_TENANT.to_string(), tenant.to_string()));
        }
        headers
    }

    /// Whether two profiles address the same broker partition.
    pub fn same_partition(&self, other: &BrokerProfile) -> bool {
        self.url.trim_end_matches('/') == other.url.trim_end_matches('/')
            && non_empty(self.tenant.as_deref()) == non_empty(other.tenant.as_deref())
            && self.effective_scope() == other.effective_scope()
    }

    fn effective_scope(&self) -> Option<&str> {
        let scope = non_empty(self.scope.as_deref());
        if self.dialect.uses_service_path() {
            Some(scope.unwrap_or("/"))
        } else {
            scope
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl BrokerRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, content_type: &str, body: Vec<u8>) -> Self {
        let mut request = Self::new(HttpMethod::Post, path);
        request
            .headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        request.body = Some(body);
        request
    }

    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerResponse {
    /// `METHOD url` of the exchange, used in error messages.
    pub endpoint: String,
    pub status: u16,
    pub reason: String,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl BrokerResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fails with `UpstreamStatus` unless `accept` holds for the status code.
    pub fn ensure_status(self, accept: impl Fn(u16) -> bool) -> MigrationResult<Self> {
        if accept(self.status) {
            return Ok(self);
        }
        Err(MigrationError::UpstreamStatus {
            status: self.status_line(),
            body: self.body_text(),
            endpoint: self.endpoint,
        })
    }
}

/// The authenticated per-broker HTTP seam the engine drives.
pub trait BrokerClient {
    fn profile(&self) -> &BrokerProfile;
    fn execute(&mut self, request: BrokerRequest) -> MigrationResult<BrokerResponse>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

pub struct HttpBrokerClient {
    client: Client,
    profile: BrokerProfile,
    config: HttpClientConfig,
    base_url: Url,
    request_count: usize,
}

impl HttpBrokerClient {
    pub fn new(profile: BrokerProfile, config: HttpClientConfig) -> Result<Self> {
        let base_url = Url::parse(profile.url.trim_end_matches('/'))
            .with_context(|| format!("invalid broker url for {}: {}", profile.name, profile.url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build broker HTTP client")?;

        Ok(Self {
            client,
            profile,
            config,
            base_url,
            request_count: 0,
        })
    }

    fn url_for(&self, path: &str) -> MigrationResult<Url> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|error| {
            MigrationError::InvalidJob(format!("invalid request url {joined}: {error}"))
        })
    }
}

impl BrokerClient for HttpBrokerClient {
    fn profile(&self) -> &BrokerProfile {
        &self.profile
    }

    fn execute(&mut self, request: BrokerRequest) -> MigrationResult<BrokerResponse> {
        let url = self.url_for(&request.path)?;
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, url)
            .header("User-Agent", self.config.user_agent.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in self.profile.scoping_headers() {
            builder = builder.header(name, value);
        }
        if let Some(token) = non_empty(self.profile.token.as_deref()) {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let built = builder.build().map_err(|error| MigrationError::Transport {
            endpoint: format!("{} {}", request.method.as_str(), request.path),
            message: error.to_string(),
        })?;
        let endpoint = format!("{} {}", built.method(), built.url());

        self.request_count += 1;
        let response = self
            .client
            .execute(built)
            .map_err(|error| MigrationError::Transport {
                endpoint: endpoint.clone(),
                message: error.to_string(),
            })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|error| MigrationError::Transport {
                endpoint: endpoint.clone(),
                message: format!("failed to read response body: {error}"),
            })?
            .to_vec();
        debug!(endpoint = %endpoint, status = status.as_u16(), bytes = body.len(), "broker exchange");

        Ok(BrokerResponse {
            endpoint,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
