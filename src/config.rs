use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::{AnthropicClient, BedrockClient, DynMessageClient, VertexClient};

/// Describes one callable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name requests use to select this backend, e.g. `claude-direct`.
    pub handle: String,
    pub backend: BackendKind,
    pub credential: Credential,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Cloud region; required by Bedrock and Vertex.
    #[serde(default)]
    pub region: Option<String>,
    /// Google Cloud project; required by Vertex.
    #[serde(default)]
    pub project_id: Option<String>,
    /// `anthropic-version` header for the direct API.
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Anthropic,
    Bedrock,
    Vertex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey { key: String },
    Bearer { token: String },
    None,
}

impl BackendConfig {
    fn new(handle: impl Into<String>, backend: BackendKind, credential: Credential) -> Self {
        Self {
            handle: handle.into(),
            backend,
            credential,
            base_url: None,
            region: None,
            project_id: None,
            version: None,
        }
    }

    /// Direct API settings from `ANTHROPIC_API_KEY`, falling back to `CLAUDE_API_KEY`.
    pub fn anthropic_from_env(handle: impl Into<String>) -> Result<Self, LLMError> {
        Self::anthropic_from_lookup(handle, env_var)
    }

    /// Vertex settings from `CLOUD_ML_REGION`, `ANTHROPIC_VERTEX_PROJECT_ID` and
    /// `GOOGLE_ACCESS_TOKEN`.
    pub fn vertex_from_env(handle: impl Into<String>) -> Result<Self, LLMError> {
        Self::vertex_from_lookup(handle, env_var)
    }

    /// Bedrock settings from `AWS_REGION` and `AWS_BEARER_TOKEN_BEDROCK`.
    pub fn bedrock_from_env(handle: impl Into<String>) -> Result<Self, LLMError> {
        Self::bedrock_from_lookup(handle, env_var)
    }

    fn anthropic_from_lookup(
        handle: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LLMError> {
        let key = lookup("ANTHROPIC_API_KEY")
            .or_else(|| lookup("CLAUDE_API_KEY"))
            .ok_or_else(|| {
                LLMError::invalid_config("ANTHROPIC_API_KEY", "not set (CLAUDE_API_KEY also empty)")
            })?;
        let mut config = Self::new(handle, BackendKind::Anthropic, Credential::ApiKey { key });
        config.base_url = lookup("ANTHROPIC_BASE_URL");
        Ok(config)
    }

    fn vertex_from_lookup(
        handle: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LLMError> {
        let token = require(&lookup, "GOOGLE_ACCESS_TOKEN")?;
        let mut config = Self::new(handle, BackendKind::Vertex, Credential::Bearer { token });
        config.region = Some(require(&lookup, "CLOUD_ML_REGION")?);
        config.project_id = Some(require(&lookup, "ANTHROPIC_VERTEX_PROJECT_ID")?);
        Ok(config)
    }

    fn bedrock_from_lookup(
        handle: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LLMError> {
        let token = require(&lookup, "AWS_BEARER_TOKEN_BEDROCK")?;
        let mut config = Self::new(handle, BackendKind::Bedrock, Credential::Bearer { token });
        config.region = Some(require(&lookup, "AWS_REGION")?);
        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn require(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, LLMError> {
    lookup(name).ok_or_else(|| LLMError::invalid_config(name, "not set"))
}

/// Builds a [`Client`] with one backend per config entry.
pub fn build_client_from_configs(
    configs: &[BackendConfig],
    transport: DynHttpTransport,
) -> Result<Client, LLMError> {
    let mut builder = Client::builder();

    for config in configs {
        let backend = build_backend_from_config(config, transport.clone())?;
        builder = builder.register_handle(config.handle.clone(), backend);
    }

    Ok(builder.build())
}

fn build_backend_from_config(
    config: &BackendConfig,
    transport: DynHttpTransport,
) -> Result<DynMessageClient, LLMError> {
    let backend: DynMessageClient = match config.backend {
        BackendKind::Anthropic => {
            let api_key = extract_secret(&config.credential, &config.handle)?;
            let mut client = AnthropicClient::new(transport, api_key);
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            if let Some(version) = &config.version {
                client = client.with_version(version.clone());
            }
            Arc::new(client)
        }
        BackendKind::Bedrock => {
            let api_key = extract_secret(&config.credential, &config.handle)?;
            let region = required_field(config.region.as_deref(), "region", &config.handle)?;
            let mut client = BedrockClient::new(transport, region, api_key);
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
        BackendKind::Vertex => {
            let token = extract_secret(&config.credential, &config.handle)?;
            let region = required_field(config.region.as_deref(), "region", &config.handle)?;
            let project = required_field(config.project_id.as_deref(), "project_id", &config.handle)?;
            let mut client = VertexClient::new(transport, region, project, token);
            if let Some(base_url) = &config.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Arc::new(client)
        }
    };

    Ok(backend)
}

fn extract_secret(credential: &Credential, handle: &str) -> Result<String, LLMError> {
    match credential {
        Credential::ApiKey { key } => Ok(key.clone()),
        Credential::Bearer { token } => Ok(token.clone()),
        Credential::None => Err(LLMError::invalid_config(
            "credential",
            format!("backend {handle} requires a credential"),
        )),
    }
}

fn required_field(value: Option<&str>, field: &str, handle: &str) -> Result<String, LLMError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(LLMError::invalid_config(
            field,
            format!("backend {handle} requires {field}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn build_client_from_configs_supports_all_backends() {
        let transport = default_dyn_transport().expect("transport");
        let mut bedrock = BackendConfig::new(
            "bedrock",
            BackendKind::Bedrock,
            Credential::Bearer {
                token: "aws-key".to_string(),
            },
        );
        bedrock.region = Some("us-west-2".to_string());
        let mut vertex = BackendConfig::new(
            "vertex",
            BackendKind::Vertex,
            Credential::Bearer {
                token: "ya29".to_string(),
            },
        );
        vertex.region = Some("us-east5".to_string());
        vertex.project_id = Some("proj".to_string());
        let direct = BackendConfig::new(
            "direct",
            BackendKind::Anthropic,
            Credential::ApiKey {
                key: "sk".to_string(),
            },
        );

        let client = build_client_from_configs(&[direct, bedrock, vertex], transport).expect("client");
        let mut handles = client.handles();
        handles.sort();
        assert_eq!(handles, vec!["bedrock", "direct", "vertex"]);
        assert_eq!(client.backend("bedrock").expect("backend"), "bedrock");
        assert_eq!(client.backend("direct").expect("backend"), "anthropic");
    }

    #[test]
    fn build_client_from_configs_requires_credential() {
        let transport = default_dyn_transport().expect("transport");
        let config = BackendConfig::new("direct", BackendKind::Anthropic, Credential::None);

        match build_client_from_configs(&[config], transport) {
            Err(LLMError::InvalidConfig { field, reason }) => {
                assert_eq!(field, "credential");
                assert!(reason.contains("direct"), "{reason}");
            }
            Err(other) => panic!("unexpected error type: {other:?}"),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn vertex_requires_project() {
        let transport = default_dyn_transport().expect("transport");
        let mut config = BackendConfig::new(
            "vertex",
            BackendKind::Vertex,
            Credential::Bearer {
                token: "t".to_string(),
            },
        );
        config.region = Some("europe-west1".to_string());

        match build_client_from_configs(&[config], transport) {
            Err(LLMError::InvalidConfig { field, .. }) => assert_eq!(field, "project_id"),
            Err(other) => panic!("unexpected error type: {other:?}"),
            Ok(_) => panic!("expected config error"),
        }
    }

    #[test]
    fn config_round_trips_through_json() {
        let json = r#"{
            "handle": "claude",
            "backend": "bedrock",
            "credential": {"type": "bearer", "token": "abc"},
            "region": "us-east-1"
        }"#;
        let config: BackendConfig = serde_json::from_str(json).expect("decode");
        assert_eq!(config.backend, BackendKind::Bedrock);
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.base_url, None);

        let back: BackendConfig =
            serde_json::from_value(serde_json::to_value(&config).expect("encode")).expect("decode");
        assert_eq!(back, config);
    }

    #[test]
    fn anthropic_env_falls_back_to_claude_key() {
        let config = BackendConfig::anthropic_from_lookup("direct", lookup(&[("CLAUDE_API_KEY", "sk-2")]))
            .expect("config");
        assert_eq!(
            config.credential,
            Credential::ApiKey {
                key: "sk-2".to_string()
            }
        );

        let preferred = BackendConfig::anthropic_from_lookup(
            "direct",
            lookup(&[("ANTHROPIC_API_KEY", "sk-1"), ("CLAUDE_API_KEY", "sk-2")]),
        )
        .expect("config");
        assert_eq!(
            preferred.credential,
            Credential::ApiKey {
                key: "sk-1".to_string()
            }
        );

        assert!(BackendConfig::anthropic_from_lookup("direct", lookup(&[])).is_err());
    }

    #[test]
    fn cloud_env_loaders_require_every_variable() {
        let vertex = BackendConfig::vertex_from_lookup(
            "vertex",
            lookup(&[
                ("CLOUD_ML_REGION", "us-east5"),
                ("ANTHROPIC_VERTEX_PROJECT_ID", "proj"),
                ("GOOGLE_ACCESS_TOKEN", "ya29"),
            ]),
        )
        .expect("vertex");
        assert_eq!(vertex.backend, BackendKind::Vertex);
        assert_eq!(vertex.project_id.as_deref(), Some("proj"));

        match BackendConfig::bedrock_from_lookup("bedrock", lookup(&[("AWS_BEARER_TOKEN_BEDROCK", "k")])) {
            Err(LLMError::InvalidConfig { field, .. }) => assert_eq!(field, "AWS_REGION"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
