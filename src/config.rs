//! Engine configuration (code defaults, overridable from the environment).

use std::time::Duration;

use crate::types::TokenUsage;

/// Tunables for the orchestration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum rounds per episode; reaching it forces termination.
    pub max_iterations: u64,
    /// Total stream attempts per reason stage (first try included).
    pub max_stream_retries: u32,
    /// Fixed delay between stream attempts.
    pub stream_retry_delay: Duration,
    /// Overall wall-clock budget for one model stream.
    pub stream_timeout: Duration,
    /// Per-chunk idle budget within a stream.
    pub stream_idle_timeout: Duration,
    /// Minimum interval between pushed content deltas.
    pub push_debounce: Duration,
    /// Byte budget for persisted tool observations; longer output is truncated.
    pub max_observe: usize,
    /// TTL for the durable iteration counter.
    pub iteration_ttl: Duration,
    /// TTL for paused-round and completion-signal state in the KV.
    pub state_ttl: Duration,
    /// Nominal per-round usage for the pre-flight balance check.
    pub preflight_usage: TokenUsage,
    /// Consecutive identical assistant replies before a strategy nudge.
    pub stuck_threshold: u32,
    /// Model used for sessions created without an explicit model id.
    pub default_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_stream_retries: 3,
            stream_retry_delay: Duration::from_secs(2),
            stream_timeout: Duration::from_secs(300),
            stream_idle_timeout: Duration::from_secs(120),
            push_debounce: Duration::from_millis(200),
            max_observe: 10_000,
            iteration_ttl: Duration::from_secs(3600),
            state_ttl: Duration::from_secs(24 * 3600),
            preflight_usage: TokenUsage::new(1024, 1024),
            stuck_threshold: 2,
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `DROVER_*` environment variables (a `.env`
    /// file is honored if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(v) = env_u64("DROVER_MAX_ITERATIONS") {
            config.max_iterations = v;
        }
        if let Some(v) = env_u64("DROVER_MAX_STREAM_RETRIES") {
            config.max_stream_retries = v as u32;
        }
        if let Some(v) = env_u64("DROVER_STREAM_RETRY_DELAY_MS") {
            config.stream_retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("DROVER_STREAM_TIMEOUT_MS") {
            config.stream_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("DROVER_STREAM_IDLE_TIMEOUT_MS") {
            config.stream_idle_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("DROVER_PUSH_DEBOUNCE_MS") {
            config.push_debounce = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("DROVER_MAX_OBSERVE") {
            config.max_observe = v as usize;
        }
        if let Ok(v) = std::env::var("DROVER_DEFAULT_MODEL") {
            if !v.is_empty() {
                config.default_model = v;
            }
        }

        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.max_stream_retries, 3);
        assert_eq!(config.push_debounce, Duration::from_millis(200));
        assert!(config.stream_timeout > config.stream_idle_timeout);
    }
}
