// src/config/mod.rs
// All values load from the environment (.env supported), with defaults per key.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    // ── Anthropic backend
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model_id: String,
    pub anthropic_max_tokens: u32,
    pub anthropic_context_window: u32,

    // ── OpenAI backend
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model_id: String,
    pub openai_context_window: u32,

    // ── Shared backend settings
    pub request_timeout: u64,
    pub temperature: f32,
    /// Headroom subtracted from the input budget on top of max output tokens.
    pub token_buffer: u32,
    /// Seconds a rate-limited backend sits out before it is tried again.
    pub rate_limit_cooldown: u64,

    // ── Logging
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean = val.split('#').next().unwrap_or("").trim();
            match clean.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => default,
            }
        }
        Err(_) => default,
    }
}

impl ForgeConfig {
    pub fn from_env() -> Self {
        // .env is optional; plain environment variables win either way.
        let _ = dotenvy::dotenv();

        Self {
            anthropic_api_key: env_var_or("ANTHROPIC_API_KEY", String::new()),
            anthropic_base_url: env_var_or(
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com".to_string(),
            ),
            anthropic_model_id: env_var_or(
                "FORGE_ANTHROPIC_MODEL",
                "claude-sonnet-4-20250514".to_string(),
            ),
            anthropic_max_tokens: env_var_or("FORGE_ANTHROPIC_MAX_TOKENS", 64_000),
            anthropic_context_window: env_var_or("FORGE_ANTHROPIC_CONTEXT_WINDOW", 200_000),
            openai_api_key: env_var_or("OPENAI_API_KEY", String::new()),
            openai_base_url: env_var_or(
                "OPENAI_BASE_URL",
                "https://api.openai.com".to_string(),
            ),
            openai_model_id: env_var_or("FORGE_OPENAI_MODEL", "gpt-5".to_string()),
            openai_context_window: env_var_or("FORGE_OPENAI_CONTEXT_WINDOW", 400_000),
            request_timeout: env_var_or("FORGE_REQUEST_TIMEOUT", 120),
            temperature: env_var_or("FORGE_TEMPERATURE", 0.0),
            token_buffer: env_var_or("FORGE_TOKEN_BUFFER", 4_096),
            rate_limit_cooldown: env_var_or("FORGE_RATE_LIMIT_COOLDOWN", 60),
            log_level: env_var_or("FORGE_LOG_LEVEL", "info".to_string()),
        }
    }
}

pub static CONFIG: Lazy<ForgeConfig> = Lazy::new(ForgeConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = ForgeConfig::from_env();
        assert_eq!(config.token_buffer, 4_096);
        assert_eq!(config.rate_limit_cooldown, 60);
    }

    #[test]
    fn env_var_or_ignores_inline_comments() {
        unsafe { std::env::set_var("FORGE_TEST_COMMENTED", "42 # answer") };
        let parsed: u32 = env_var_or("FORGE_TEST_COMMENTED", 0);
        assert_eq!(parsed, 42);
        unsafe { std::env::remove_var("FORGE_TEST_COMMENTED") };
    }
}
