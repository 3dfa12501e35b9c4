use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig, openai::OpenAiProvider,
};
use anyhow::Result;

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider + Send + Sync>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{AnthropicProviderConfig, OpenAiProviderConfig};

    #[test]
    fn test_get_provider_for_each_config() {
        let openai = ProviderConfig::OpenAi(OpenAiProviderConfig::new("key".to_string()));
        assert!(get_provider(openai).is_ok());

        let anthropic = ProviderConfig::Anthropic(AnthropicProviderConfig::new("key".to_string()));
        assert!(get_provider(anthropic).is_ok());
    }
}
