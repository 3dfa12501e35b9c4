use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use magpie::providers::configs::{
    AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig, ANTHROPIC_CLASSIFIER_MODEL,
    ANTHROPIC_DEFAULT_MODEL, ANTHROPIC_HOST, OPENAI_DEFAULT_MODEL, OPENAI_HOST,
};
use serde::Deserialize;
use std::net::SocketAddr;

/// Completion cap for the command review tier, the verdict is a tiny object
const CLASSIFIER_MAX_TOKENS: i32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Failed to parse socket address")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkspaceSettings {
    /// Directory the agent's tools are confined to
    #[serde(default = "default_workspace_root")]
    pub root: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default = "default_openai_classifier_model")]
        classifier_model: String,
        #[serde(default = "default_temperature")]
        temperature: Option<f32>,
        #[serde(default = "default_max_tokens")]
        max_tokens: Option<i32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default = "default_anthropic_classifier_model")]
        classifier_model: String,
        #[serde(default = "default_temperature")]
        temperature: Option<f32>,
        #[serde(default = "default_max_tokens")]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    /// Convert to a pair of provider configs: the model driving the agent
    /// and the cheaper tier that reviews shell commands
    pub fn into_configs(self) -> (ProviderConfig, ProviderConfig) {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                classifier_model,
                temperature,
                max_tokens,
            } => (
                ProviderConfig::OpenAi(OpenAiProviderConfig {
                    host: host.clone(),
                    api_key: api_key.clone(),
                    model,
                    temperature,
                    max_tokens,
                }),
                ProviderConfig::OpenAi(OpenAiProviderConfig {
                    host,
                    api_key,
                    model: classifier_model,
                    temperature: None,
                    max_tokens: Some(CLASSIFIER_MAX_TOKENS),
                }),
            ),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                classifier_model,
                temperature,
                max_tokens,
            } => (
                ProviderConfig::Anthropic(AnthropicProviderConfig {
                    host: host.clone(),
                    api_key: api_key.clone(),
                    model,
                    temperature,
                    max_tokens,
                }),
                ProviderConfig::Anthropic(AnthropicProviderConfig {
                    host,
                    api_key,
                    model: classifier_model,
                    temperature: None,
                    max_tokens: Some(CLASSIFIER_MAX_TOKENS),
                }),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("workspace.root", default_workspace_root())?;

        // The provider's conventional key variable (ANTHROPIC_API_KEY or
        // OPENAI_API_KEY) works as a fallback. Defaults are the lowest
        // precedence layer, so MAGPIE_PROVIDER__API_KEY still wins.
        if let Ok(api_key) = std::env::var(conventional_api_key_var()) {
            builder = builder.set_default("provider.api_key", api_key)?;
        }

        let config = builder
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("MAGPIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `type`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// The key variable providers document themselves, keyed off the selected
/// provider type (defaulting to Anthropic, like the rest of the settings)
fn conventional_api_key_var() -> &'static str {
    match std::env::var("MAGPIE_PROVIDER__TYPE").ok().as_deref() {
        Some("openai") => "OPENAI_API_KEY",
        _ => "ANTHROPIC_API_KEY",
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_workspace_root() -> String {
    ".".to_string()
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_DEFAULT_MODEL.to_string()
}

fn default_openai_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_DEFAULT_MODEL.to_string()
}

fn default_anthropic_classifier_model() -> String {
    ANTHROPIC_CLASSIFIER_MODEL.to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.7)
}

fn default_max_tokens() -> Option<i32> {
    Some(2000)
}
