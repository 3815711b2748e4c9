use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::client::{BrokerProfile, HttpClientConfig};
use crate::dialect::Dialect;

pub const DEFAULT_USER_AGENT: &str = concat!("ngsitool/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub brokers: BTreeMap<String, BrokerSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BrokerSection {
    pub url: String,
    pub dialect: Option<Dialect>,
    pub tenant: Option<String>,
    pub scope: Option<String>,
    pub token: Option<String>,
}

/// Per-invocation adjustments layered over a broker profile.
#[derive(Debug, Clone, Default)]
pub struct BrokerOverrides {
    pub dialect: Option<Dialect>,
    /// `--ngsi-v1`: talk to a flat-JSON broker through its legacy API.
    pub legacy: bool,
    pub tenant: Option<String>,
    pub scope: Option<String>,
    pub token: Option<String>,
}

impl ToolConfig {
    /// Resolve the request timeout: env NGSITOOL_HTTP_TIMEOUT_MS > config > default.
    pub fn timeout_ms(&self) -> Result<u64> {
        self.timeout_ms_with_lookup(|key| env::var(key).ok())
    }

    fn timeout_ms_with_lookup<F>(&self, lookup_env: F) -> Result<u64>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup_env("NGSITOOL_HTTP_TIMEOUT_MS") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.parse::<u64>().with_context(|| {
                    format!("NGSITOOL_HTTP_TIMEOUT_MS must be milliseconds, got `{trimmed}`")
                });
            }
        }
        Ok(self.http.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Resolve user agent: env NGSITOOL_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        self.user_agent_with_lookup(|key| env::var(key).ok())
    }

    fn user_agent_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup_env("NGSITOOL_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.http
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn http_client_config(&self) -> Result<HttpClientConfig> {
        Ok(HttpClientConfig {
            timeout_ms: self.timeout_ms()?,
            user_agent: self.user_agent(),
        })
    }

    /// Turn a `--host` argument into a broker profile. `target` is either an
    /// alias under `[brokers]` or a literal `http(s)://` URL.
    pub fn resolve_broker(&self, target: &str, overrides: &BrokerOverrides) -> Result<BrokerProfile> {
        let target = target.trim();
        if target.is_empty() {
            bail!("broker must be an alias or an http(s) URL");
        }

        let mut profile = if is_url(target) {
            BrokerProfile::new(
                target,
                target,
                overrides.dialect.unwrap_or(Dialect::FlatJson),
            )
        } else {
            let Some(section) = self.brokers.get(target) else {
                bail!("unknown broker `{target}`: not a URL and not defined under [brokers]");
            };
            if !is_url(section.url.trim()) {
                bail!(
                    "broker `{target}` has an invalid url `{}` (expected http:// or https://)",
                    section.url
                );
            }
            let mut profile = BrokerProfile::new(
                target,
                section.url.trim(),
                overrides
                    .dialect
                    .or(section.dialect)
                    .unwrap_or(Dialect::FlatJson),
            );
            profile.tenant = section.tenant.clone();
            profile.scope = section.scope.clone();
            profile.token = section.token.clone();
            profile
        };

        if overrides.legacy {
            match profile.dialect {
                Dialect::FlatJson | Dialect::Legacy => profile.dialect = Dialect::Legacy,
                Dialect::LinkedData => {
                    bail!("--ngsi-v1 cannot be used with linked-data broker `{target}`")
                }
            }
        }
        if let Some(tenant) = &overrides.tenant {
            profile.tenant = Some(tenant.clone());
        }
        if let Some(scope) = &overrides.scope {
            profile.scope = Some(scope.clone());
        }
        if let Some(token) = &overrides.token {
            profile.token = Some(token.clone());
        }
        Ok(profile)
    }
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[http]
timeout_ms = 5000
user_agent = "ops-migrate/2.0"

[brokers.orion]
url = "http://localhost:1026"
dialect = "flat-json"
tenant = "openiot"
scope = "/rooms"

[brokers.scorpio]
url = "http://localhost:9090/"
dialect = "linked-data"
token = "secret"
"#;

    fn sample() -> ToolConfig {
        toml::from_str(SAMPLE).expect("sample config")
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.brokers.is_empty());
        assert_eq!(config.http, HttpSection::default());
    }

    #[test]
    fn load_config_parses_http_and_brokers() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, SAMPLE).expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.http.timeout_ms, Some(5000));
        assert_eq!(config.brokers.len(), 2);
        let orion = &config.brokers["orion"];
        assert_eq!(orion.dialect, Some(Dialect::FlatJson));
        assert_eq!(orion.tenant.as_deref(), Some("openiot"));
        assert_eq!(config.brokers["scorpio"].dialect, Some(Dialect::LinkedData));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[brokers.orion\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_unknown_dialect() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            "[brokers.orion]\nurl = \"http://localhost:1026\"\ndialect = \"ngsi-v3\"\n",
        )
        .expect("write config");
        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn http_settings_prefer_env_then_config_then_default() {
        let config = sample();
        let env = HashMap::from([
            ("NGSITOOL_HTTP_TIMEOUT_MS".to_string(), "1200".to_string()),
            ("NGSITOOL_USER_AGENT".to_string(), "from-env/1".to_string()),
        ]);
        assert_eq!(
            config
                .timeout_ms_with_lookup(|key| env.get(key).cloned())
                .expect("timeout"),
            1200
        );
        assert_eq!(
            config.user_agent_with_lookup(|key| env.get(key).cloned()),
            "from-env/1"
        );

        assert_eq!(config.timeout_ms_with_lookup(|_| None).expect("timeout"), 5000);
        assert_eq!(config.user_agent_with_lookup(|_| None), "ops-migrate/2.0");

        let empty = ToolConfig::default();
        assert_eq!(
            empty.timeout_ms_with_lookup(|_| None).expect("timeout"),
            DEFAULT_TIMEOUT_MS
        );
        assert!(empty.user_agent_with_lookup(|_| None).starts_with("ngsitool/"));
    }

    #[test]
    fn non_numeric_timeout_env_is_an_error() {
        let error = ToolConfig::default()
            .timeout_ms_with_lookup(|_| Some("soon".to_string()))
            .expect_err("not a number");
        assert!(error.to_string().contains("NGSITOOL_HTTP_TIMEOUT_MS"));
    }

    #[test]
    fn alias_resolves_profile_fields() {
        let profile = sample()
            .resolve_broker("orion", &BrokerOverrides::default())
            .expect("resolve");
        assert_eq!(profile.name, "orion");
        assert_eq!(profile.url, "http://localhost:1026");
        assert_eq!(profile.dialect, Dialect::FlatJson);
        assert_eq!(profile.tenant.as_deref(), Some("openiot"));
        assert_eq!(profile.scope.as_deref(), Some("/rooms"));
        assert!(profile.token.is_none());
    }

    #[test]
    fn literal_url_defaults_to_flat_json_unless_dialect_given() {
        let config = ToolConfig::default();
        let flat = config
            .resolve_broker("http://orion:1026", &BrokerOverrides::default())
            .expect("resolve");
        assert_eq!(flat.dialect, Dialect::FlatJson);
        assert_eq!(flat.url, "http://orion:1026");

        let ld = config
            .resolve_broker(
                "https://broker.example.org",
                &BrokerOverrides {
                    dialect: Some(Dialect::LinkedData),
                    ..BrokerOverrides::default()
                },
            )
            .expect("resolve");
        assert_eq!(ld.dialect, Dialect::LinkedData);
    }

    #[test]
    fn command_line_overrides_replace_profile_values() {
        let profile = sample()
            .resolve_broker(
                "orion",
                &BrokerOverrides {
                    tenant: Some("smartcity".to_string()),
                    scope: Some("/parking".to_string()),
                    token: Some("abc".to_string()),
                    ..BrokerOverrides::default()
                },
            )
            .expect("resolve");
        assert_eq!(profile.tenant.as_deref(), Some("smartcity"));
        assert_eq!(profile.scope.as_deref(), Some("/parking"));
        assert_eq!(profile.token.as_deref(), Some("abc"));
    }

    #[test]
    fn ngsi_v1_switches_flat_json_to_legacy() {
        let legacy = BrokerOverrides {
            legacy: true,
            ..BrokerOverrides::default()
        };
        let profile = sample().resolve_broker("orion", &legacy).expect("resolve");
        assert_eq!(profile.dialect, Dialect::Legacy);

        let error = sample()
            .resolve_broker("scorpio", &legacy)
            .expect_err("linked-data has no legacy API");
        assert!(error.to_string().contains("--ngsi-v1"));
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let error = sample()
            .resolve_broker("nowhere", &BrokerOverrides::default())
            .expect_err("unknown");
        assert!(error.to_string().contains("unknown broker `nowhere`"));
    }
}
