//! xAI backend adapter
//!
//! Straight passthrough of the translated request; no web-search
//! interception.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use claudeproxy_tools::ToolRegistry;

use super::{Adapter, ClientEventStream, complete, complete_stream, plan_from};
use crate::backend::client::BackendClient;
use crate::error::ProxyError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::select::{ModelSelector, XAI_PROFILE, user_text};

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

/// Adapter for the xAI chat-completions backend
pub struct XaiAdapter {
    client: BackendClient,
    registry: Arc<ToolRegistry>,
    selector: ModelSelector,
}

impl XaiAdapter {
    /// Build the adapter against the production endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: SecretString,
        registry: Arc<ToolRegistry>,
        haiku_high_reasoning: bool,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("valid default URL");
        Self::with_base_url(base_url, api_key, registry, haiku_high_reasoning)
    }

    /// Build the adapter against a specific endpoint (tests point this at a
    /// mock backend)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_base_url(
        base_url: Url,
        api_key: SecretString,
        registry: Arc<ToolRegistry>,
        haiku_high_reasoning: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: BackendClient::new("xai", base_url, api_key)?,
            registry,
            selector: ModelSelector::new(&XAI_PROFILE, haiku_high_reasoning),
        })
    }

    fn plan(&self, request: &AnthropicRequest) -> crate::transform::RoutePlan {
        let text = user_text(request);
        let selection = self
            .selector
            .select(&request.model, &text, request.declared_tool_names());
        tracing::debug!(model = %selection.model, "selected backend model");
        plan_from(&selection, self.selector.profile(), true)
    }
}

#[async_trait]
impl Adapter for XaiAdapter {
    fn name(&self) -> &'static str {
        "xai"
    }

    fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    async fn handle(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProxyError> {
        let plan = self.plan(&request);
        complete(&self.client, &self.registry, &request, &plan).await
    }

    async fn handle_stream(&self, request: AnthropicRequest) -> Result<ClientEventStream, ProxyError> {
        let plan = self.plan(&request);
        complete_stream(&self.client, &self.registry, &request, &plan).await
    }
}
