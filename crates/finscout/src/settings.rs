use std::env;

use thiserror::Error;

const DEFAULT_MODEL: &str = "gpt-4.1";
const DEFAULT_MODEL_PROVIDER: &str = "openai";
const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_FINANCIAL_DATA_BASE_URL: &str = "https://api.financialdatasets.ai";
const DEFAULT_SEARCH_BASE_URL: &str = "https://api.search.brave.com/res/v1/web";

/// Errors from reading [`Settings`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A variable that must hold a positive integer does not.
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Process-level configuration of the assistant.
///
/// Secrets are not part of the settings; they are resolved through a
/// credential resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// `FINSCOUT_MODEL`.
    pub model: String,
    /// `FINSCOUT_MODEL_PROVIDER`.
    pub model_provider: String,
    /// `FINSCOUT_MAX_ITERATIONS`.
    pub max_iterations: usize,
    /// `OPENAI_BASE_URL`, for OpenAI-compatible gateways.
    pub openai_base_url: Option<String>,
    /// `FINANCIAL_DATA_BASE_URL`.
    pub financial_data_base_url: String,
    /// `SEARCH_BASE_URL`.
    pub search_base_url: String,
}

impl Settings {
    /// Reads the settings from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`. Unset and blank variables take
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let max_iterations = match get("FINSCOUT_MAX_ITERATIONS") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(SettingsError::InvalidNumber {
                        name: "FINSCOUT_MAX_ITERATIONS",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_ITERATIONS,
        };

        Ok(Self {
            model: get("FINSCOUT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            model_provider: get("FINSCOUT_MODEL_PROVIDER")
                .unwrap_or_else(|| DEFAULT_MODEL_PROVIDER.to_owned()),
            max_iterations,
            openai_base_url: get("OPENAI_BASE_URL"),
            financial_data_base_url: get("FINANCIAL_DATA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FINANCIAL_DATA_BASE_URL.to_owned()),
            search_base_url: get("SEARCH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.to_owned()),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            model_provider: DEFAULT_MODEL_PROVIDER.to_owned(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            openai_base_url: None,
            financial_data_base_url: DEFAULT_FINANCIAL_DATA_BASE_URL.to_owned(),
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_owned(),
        }
    }
}
