use std::env;
use std::time::Duration;

use crate::cli::BackendArgs;

pub const INDEX_API_KEY_ENV: &str = "SOLACE_INDEX_API_KEY";

/// Attempt cap for the generation call, counting the first attempt.
pub const GENERATION_MAX_ATTEMPTS: u32 = 3;

/// Base delay for the generation retry schedule; attempt n waits n times this.
pub const GENERATION_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Intent translation is best-effort and gets a tighter deadline than the
/// main generation call.
pub const TRANSLATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub generation_url: String,
    pub generation_model: String,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub index_url: String,
    pub namespace: String,
    pub index_api_key: Option<String>,
    pub search_timeout: Duration,
    pub generation_timeout: Duration,
    pub generation_attempts: u32,
    pub generation_backoff: Duration,
}

impl BackendSettings {
    pub fn resolve(args: &BackendArgs) -> Self {
        Self {
            generation_url: normalize_base_url(&args.generation_url),
            generation_model: args.generation_model.trim().to_string(),
            embedding_url: normalize_base_url(&args.embedding_url),
            embedding_model: args.embedding_model.trim().to_string(),
            embedding_dim: args.embedding_dim.max(1),
            index_url: normalize_base_url(&args.index_url),
            namespace: args.namespace.trim().to_string(),
            index_api_key: read_optional_env(INDEX_API_KEY_ENV),
            search_timeout: Duration::from_millis(args.search_timeout_ms.max(1)),
            generation_timeout: Duration::from_millis(args.generation_timeout_ms.max(1)),
            generation_attempts: GENERATION_MAX_ATTEMPTS,
            generation_backoff: GENERATION_BACKOFF_BASE,
        }
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn read_optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:6333/"),
            "http://127.0.0.1:6333"
        );
        assert_eq!(
            normalize_base_url("  http://localhost:11434  "),
            "http://localhost:11434"
        );
    }
}
