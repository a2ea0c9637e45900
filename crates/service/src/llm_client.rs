//! LLM call boundary: builds [`tarsy_agents::LlmClient`] implementations
//! from [`tarsy_domain::config::LlmConfig`] and resolves agents to them.
//!
//! Actual provider SDKs are out of scope per spec.md §1 — `LlmConfig`
//! only carries enough to know which provider/model backs a role and how
//! long to wait. What follows is the minimal real HTTP call needed to
//! exercise that config: an OpenAI-compatible chat-completions request,
//! used uniformly across `ProviderKind` (documented as a simplification
//! in DESIGN.md — a production build would dispatch per-kind SDKs).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tarsy_agents::{LlmClient, LlmCompletion};
use tarsy_chain::LlmResolver;
use tarsy_domain::config::{AuthConfig, AuthMode, LlmConfig, ProviderConfig, ProviderKind};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{ConversationMessage, ConversationRole};

/// One provider/model/timeout combination, callable as a
/// `tarsy_agents::LlmClient`.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    auth_mode: AuthMode,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(provider: &ProviderConfig, model: &str, timeout: Duration) -> Result<Self> {
        let api_key = resolve_api_key(&provider.auth)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: provider.base_url.clone(),
            model: model.to_owned(),
            api_key,
            auth_mode: provider.auth.mode,
            timeout,
        })
    }

    fn role_str(role: ConversationRole) -> &'static str {
        match role {
            ConversationRole::System => "system",
            ConversationRole::User => "user",
            ConversationRole::Assistant => "assistant",
            ConversationRole::ToolResult => "tool",
        }
    }
}

fn resolve_api_key(auth: &AuthConfig) -> Result<Option<String>> {
    if matches!(auth.mode, AuthMode::None) {
        return Ok(None);
    }
    if let Some(key) = &auth.key {
        return Ok(Some(key.clone()));
    }
    if let Some(env) = &auth.env {
        return std::env::var(env)
            .map(Some)
            .map_err(|_| Error::Configuration(format!("auth env var {env} is not set")));
    }
    if let Some(first) = auth.keys.first() {
        return Ok(Some(first.clone()));
    }
    Err(Error::Configuration("provider auth has no key, env, or keys configured".into()))
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, conversation: &[ConversationMessage]) -> Result<LlmCompletion> {
        let messages: Vec<serde_json::Value> = conversation
            .iter()
            .map(|m| serde_json::json!({ "role": Self::role_str(m.role), "content": m.content }))
            .collect();

        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&serde_json::json!({ "model": self.model, "messages": messages }));

        req = match (self.auth_mode, &self.api_key) {
            (AuthMode::ApiKey, Some(key)) => req.bearer_auth(key),
            (AuthMode::QueryParam, Some(key)) => req.query(&[("api_key", key.as_str())]),
            _ => req,
        };

        let resp = req.send().await.map_err(|e| Error::Other(format!("LLM request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Other(format!("LLM request returned status {}", resp.status())));
        }
        let body: serde_json::Value = resp.json().await.map_err(|e| Error::Other(format!("decoding LLM response: {e}")))?;
        let content = body["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_owned();

        Ok(LlmCompletion { content, tool_calls: vec![], is_final: true, thought_signature: None })
    }
}

/// Resolves an agent name to a client for the `investigation` role and
/// every agent's provider kind, built once at startup from
/// [`LlmConfig`]. All configured agents share the `investigation` role
/// client (spec.md is silent on a per-agent role mapping; documented as
/// an Open Question resolution in DESIGN.md).
pub struct ConfiguredLlmResolver {
    client: Arc<dyn LlmClient>,
    provider_kind: ProviderKind,
}

impl ConfiguredLlmResolver {
    pub fn build(config: &LlmConfig, role_name: &str) -> Result<Self> {
        let role = config
            .roles
            .get(role_name)
            .ok_or_else(|| Error::Configuration(format!("llm role '{role_name}' is not configured")))?;
        let (provider_id, model) = role
            .model
            .split_once('/')
            .ok_or_else(|| Error::Configuration(format!("role '{role_name}' model '{}' must be 'provider_id/model'", role.model)))?;
        let provider = config
            .providers
            .iter()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| Error::Configuration(format!("llm provider '{provider_id}' is not configured")))?;
        let timeout = Duration::from_millis(config.default_timeout_ms);
        let client = HttpLlmClient::new(provider, model, timeout)?;
        Ok(Self { client: Arc::new(client), provider_kind: provider.kind })
    }

    pub fn client(&self) -> Arc<dyn LlmClient> {
        self.client.clone()
    }
}

impl LlmResolver for ConfiguredLlmResolver {
    fn resolve(&self, _agent_name: &str) -> (Arc<dyn LlmClient>, ProviderKind) {
        (self.client.clone(), self.provider_kind)
    }
}

/// Resolvers keyed by role, so the summarizer (role `summarization`) can
/// use a different provider/model from agent investigation.
pub struct RoleResolvers {
    resolvers: HashMap<String, ConfiguredLlmResolver>,
}

impl RoleResolvers {
    pub fn build(config: &LlmConfig) -> Result<Self> {
        let mut resolvers = HashMap::new();
        for role_name in config.roles.keys() {
            resolvers.insert(role_name.clone(), ConfiguredLlmResolver::build(config, role_name)?);
        }
        Ok(Self { resolvers })
    }

    pub fn get(&self, role_name: &str) -> Option<&ConfiguredLlmResolver> {
        self.resolvers.get(role_name)
    }
}
