use std::sync::Arc;

use finscout_model::ModelProvider;

use super::{Agent, AgentConfig};
use crate::credentials::{CredentialResolver, Credentials, Layered};
use crate::model_client::ModelClient;
use crate::tool::Registry;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    registry: Registry,
    credentials: Arc<dyn CredentialResolver>,
    config: AgentConfig,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(provider: P) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder around an existing model client.
    #[inline]
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            registry: Registry::new(),
            credentials: Arc::new(Credentials::new()),
            config: AgentConfig::default(),
        }
    }

    /// Sets the tools available to the agent.
    #[inline]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the process-level credentials handed to tools.
    #[inline]
    pub fn with_credentials(
        mut self,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the configuration.
    #[inline]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let Self {
            model_client,
            registry,
            credentials,
            config,
        } = self;

        let credentials: Arc<dyn CredentialResolver> = match &config.credentials {
            Some(overrides) => Arc::new(Layered::new(Arc::clone(overrides), credentials)),
            None => credentials,
        };
        Agent {
            model_client: model_client.with_retry(config.retry),
            registry: Arc::new(registry),
            config: Arc::new(config),
            credentials,
        }
    }
}
