use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a missing settings field back to the environment variable a user
/// would set for it. All required fields live under the provider section.
pub fn to_env_var(field: &str) -> String {
    if field == "provider" {
        // No provider section at all, the type tag is the first thing needed
        return "MAGPIE_PROVIDER__TYPE".to_string();
    }
    format!("MAGPIE_PROVIDER__{}", field.to_uppercase())
}
