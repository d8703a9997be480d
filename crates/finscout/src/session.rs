use std::sync::Arc;

use finscout_core::conversation::InMemoryHistory;
use finscout_core::credentials::{CredentialResolver, Credentials, Layered};
use finscout_core::{AgentBuilder, AgentConfig, EventStream, ModelClient};
use finscout_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use thiserror::Error;

use crate::data::{FINANCIAL_DATA_API_KEY, HttpDataSource, SEARCH_API_KEY};
use crate::settings::Settings;
use crate::tools::{ToolBackends, build_registry};

/// Credential holding the OpenAI API key.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Every credential the assistant knows how to use.
pub const CREDENTIAL_NAMES: [&str; 3] =
    [OPENAI_API_KEY, FINANCIAL_DATA_API_KEY, SEARCH_API_KEY];

#[derive(Debug, Error)]
enum SetupError {
    #[error("unknown model provider: {0}")]
    UnknownProvider(String),
    #[error("{0} is not configured")]
    MissingCredential(&'static str),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    settings: Settings,
    credentials: Option<Arc<dyn CredentialResolver>>,
    backends: Option<ToolBackends>,
    model_client: Option<ModelClient>,
    history_len: usize,
}

impl SessionBuilder {
    /// Creates a session builder with the given settings.
    #[inline]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            credentials: None,
            backends: None,
            model_client: None,
            history_len: 5,
        }
    }

    /// Sets the process-level credentials. Without this, the credentials
    /// in [`CREDENTIAL_NAMES`] are read from the environment once, when
    /// the session is built.
    #[inline]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replaces the HTTP data sources.
    #[inline]
    pub fn with_backends(mut self, backends: ToolBackends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Uses `model_client` for every run instead of building one from the
    /// settings.
    #[inline]
    pub fn with_model_client(mut self, model_client: ModelClient) -> Self {
        self.model_client = Some(model_client);
        self
    }

    /// Sets how many question/answer exchanges are remembered.
    #[inline]
    pub fn with_history_len(mut self, exchanges: usize) -> Self {
        self.history_len = exchanges;
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(Credentials::from_env(CREDENTIAL_NAMES)));
        let backends = self.backends.unwrap_or_else(|| ToolBackends {
            financial: Arc::new(HttpDataSource::new(&self.settings.financial_data_base_url)),
            search: Arc::new(
                HttpDataSource::new(&self.settings.search_base_url)
                    .with_credential(SEARCH_API_KEY)
                    .with_api_key_header("X-Subscription-Token"),
            ),
        });
        Session {
            settings: self.settings,
            credentials,
            backends,
            model_client: self.model_client,
            history: InMemoryHistory::new(self.history_len),
        }
    }
}

/// A conversation with the assistant.
///
/// Each [`ask`](Session::ask) is an independent run; the session carries
/// the settings, credentials and the recent exchanges between them.
pub struct Session {
    settings: Settings,
    credentials: Arc<dyn CredentialResolver>,
    backends: ToolBackends,
    model_client: Option<ModelClient>,
    history: InMemoryHistory,
}

impl Session {
    /// Returns the settings.
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the run configuration derived from the settings.
    pub fn default_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_model(&self.settings.model)
            .with_model_provider(&self.settings.model_provider)
            .with_max_iterations(self.settings.max_iterations)
    }

    /// Starts a run for `query`.
    ///
    /// Setup failures, such as an unknown provider or a missing model
    /// credential, come back as a stream with a single `Error` event.
    pub fn ask(&self, query: &str, config: AgentConfig) -> EventStream {
        let credentials: Arc<dyn CredentialResolver> = match &config.credentials {
            Some(overrides) => Arc::new(Layered::new(
                Arc::clone(overrides),
                Arc::clone(&self.credentials),
            )),
            None => Arc::clone(&self.credentials),
        };
        let model_client = match self.model_client(&config, &*credentials) {
            Ok(model_client) => model_client,
            Err(err) => {
                warn!("cannot start a run: {err}");
                return EventStream::failed(err);
            }
        };

        let registry = build_registry(model_client.clone(), &*credentials, &self.backends);
        debug!("tools for this run: {:?}", registry.names().collect::<Vec<_>>());
        AgentBuilder::with_model_client(model_client)
            .with_registry(registry)
            .with_credentials(Arc::clone(&self.credentials))
            .with_config(config)
            .build()
            .run(query, Some(&self.history))
    }

    /// Remembers a finished exchange for later runs.
    #[inline]
    pub fn record_exchange(&mut self, query: &str, answer: &str) {
        self.history.record_exchange(query, answer);
    }

    /// Forgets every exchange.
    #[inline]
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn model_client(
        &self,
        config: &AgentConfig,
        credentials: &dyn CredentialResolver,
    ) -> Result<ModelClient, SetupError> {
        if let Some(model_client) = &self.model_client {
            return Ok(model_client.clone());
        }

        let provider = config
            .model_provider
            .as_deref()
            .unwrap_or(&self.settings.model_provider);
        let model = config.model.as_deref().unwrap_or(&self.settings.model);
        match provider {
            "openai" => {
                let api_key = credentials
                    .resolve(OPENAI_API_KEY)
                    .ok_or(SetupError::MissingCredential(OPENAI_API_KEY))?;
                let mut builder =
                    OpenAIConfigBuilder::with_api_key(api_key.expose()).with_model(model);
                if let Some(base_url) = &self.settings.openai_base_url {
                    builder = builder.with_base_url(base_url);
                }
                Ok(ModelClient::new(OpenAIProvider::new(builder.build())))
            }
            other => Err(SetupError::UnknownProvider(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use finscout_core::AgentEvent;
    use finscout_core::model::ModelMessage;
    use finscout_test_model::{PresetResponse, TestModelProvider};
    use futures::StreamExt;

    use super::*;

    fn session_with(credentials: Credentials) -> Session {
        SessionBuilder::new(Settings::default())
            .with_credentials(Arc::new(credentials))
            .build()
    }

    #[tokio::test]
    async fn test_missing_model_credential() {
        let session = session_with(Credentials::new());
        let events: Vec<_> = session
            .ask("AAPL?", session.default_config())
            .collect()
            .await;
        assert_eq!(
            events,
            [AgentEvent::Error {
                error: "OPENAI_API_KEY is not configured".to_owned()
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let session = session_with(Credentials::new().with(OPENAI_API_KEY, "sk-test"));
        let config = session.default_config().with_model_provider("mainframe");
        let events: Vec<_> = session.ask("AAPL?", config).collect().await;
        assert_eq!(
            events,
            [AgentEvent::Error {
                error: "unknown model provider: mainframe".to_owned()
            }]
        );
    }

    #[tokio::test]
    async fn test_history_carries_over() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_text("Apple is AAPL."));
        provider.add_assistant_response_step(PresetResponse::with_text("It trades on NASDAQ."));

        let mut session = SessionBuilder::new(Settings::default())
            .with_credentials(Arc::new(Credentials::new()))
            .with_model_client(ModelClient::new(provider.clone()))
            .build();

        let events: Vec<_> = session
            .ask("Ticker of Apple?", session.default_config())
            .collect()
            .await;
        let Some(AgentEvent::Done { answer, .. }) = events.last() else {
            panic!("expected a done event, got {events:?}");
        };
        session.record_exchange("Ticker of Apple?", answer);

        session
            .ask("Where is it listed?", session.default_config())
            .collect::<Vec<_>>()
            .await;

        let messages = &provider.requests()[1].messages;
        assert_eq!(messages[1], ModelMessage::User("Ticker of Apple?".to_owned()));
        assert_eq!(messages[2], ModelMessage::Assistant("Apple is AAPL.".to_owned()));
        // Without a financial data key the router is still offered.
        assert_eq!(provider.requests()[1].tools.len(), 1);
    }
}
