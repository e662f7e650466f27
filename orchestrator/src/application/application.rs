use std::sync::Arc;
use std::time::Duration;

use llm_client::clients::ollama::OllamaClient;
use llm_client::clients::openai_compatible::OpenAICompatibleClient;
use llm_client::clients::types::LLMClient;
use llm_client::provider::{LLMProviderAPIKeys, OllamaProvider, OpenAICompatibleConfig};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::discovery::DiscoveryService;
use crate::grpc::AgentDispatcher;
use crate::handlers::LocalHandlers;
use crate::reasoning::ReasoningEngine;
use crate::session::SessionRegistry;

use super::{config::configuration::Configuration, logging::tracing::tracing_subscribe};

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Process-wide state: one of each dependency, shared by every session and
/// request. Constructed once at startup from `Configuration`.
#[derive(Clone)]
pub struct Application {
    pub config: Arc<Configuration>,
    pub sessions: SessionRegistry,
    pub discovery: Arc<DiscoveryService>,
    pub dispatcher: Arc<AgentDispatcher>,
    pub reasoning: Arc<ReasoningEngine>,
    pub handlers: Arc<LocalHandlers>,
}

impl Application {
    pub async fn initialize(config: Configuration) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let discovery = Arc::new(DiscoveryService::new(
            config.discovery_port,
            Duration::from_secs_f64(config.discovery_timeout_secs),
            Duration::from_secs(config.discovery_cache_ttl_secs),
            Some(config.host_address.clone()).filter(|s| !s.is_empty()),
        ));

        let dispatcher = Arc::new(AgentDispatcher::new(discovery.clone(), &config));

        let (llm, api_key): (Arc<dyn LLMClient + Send + Sync>, LLMProviderAPIKeys) = match config.llm_provider.as_str() {
            "openai_compatible" => (
                Arc::new(OpenAICompatibleClient::new()),
                LLMProviderAPIKeys::OpenAICompatible(OpenAICompatibleConfig::new(config.llm_api_key.clone(), config.llm_endpoint.clone())),
            ),
            other => {
                if other != "ollama" {
                    warn!(provider = other, "unknown llm_provider, falling back to ollama");
                }
                let mut ollama = OllamaClient::new();
                ollama.base_url = config.llm_endpoint.clone();
                (Arc::new(ollama), LLMProviderAPIKeys::Ollama(OllamaProvider {}))
            }
        };
        let reasoning = Arc::new(ReasoningEngine::new(llm, api_key, config.llm_model.clone(), config.max_reasoning_steps));

        let handlers = Arc::new(LocalHandlers::new(config.workspace_root.clone()));
        let sessions = SessionRegistry::new(config.max_sessions);

        Ok(Self {
            config,
            sessions,
            discovery,
            dispatcher,
            reasoning,
            handlers,
        })
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if !tracing_subscribe(config) {
            warn!("Failed to install tracing_subscriber. There's probably one already...");
        };

        if color_eyre::install().is_err() {
            warn!("Failed to install color-eyre. Oh well...");
        };

        LOGGER_INSTALLED.set(true).unwrap();
    }
}
