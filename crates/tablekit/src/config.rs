use std::{env, time::Duration};

use crate::retry::RetryPolicy;

/// Data-access configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix prepended to every table name (default: "")
    pub environment: String,
    /// Custom DynamoDB endpoint, e.g. a local emulator (default: none)
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: String,
    /// Read-through cache freshness window in seconds (default: 120)
    pub cache_ttl_seconds: u64,
    /// Retries after the first attempt for retried writes (default: 1)
    pub retry_count: u32,
    /// Delay between retried attempts in milliseconds (default: 250)
    pub retry_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TABLEKIT_ENVIRONMENT` (or `environment`) - Table name prefix
    /// - `AWS_ENDPOINT_URL` - Custom DynamoDB endpoint
    /// - `AWS_REGION` - AWS region (default: "us-east-1")
    /// - `CACHE_TTL_SECONDS` - Cache freshness window (default: 120)
    /// - `RETRY_COUNT` - Default retry count (default: 1)
    /// - `RETRY_DELAY_MS` - Default retry delay (default: 250)
    pub fn from_env() -> Self {
        Self {
            environment: env::var("TABLEKIT_ENVIRONMENT")
                .or_else(|_| env::var("environment"))
                .unwrap_or_default(),
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            cache_ttl_seconds: env::var("CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            retry_count: env::var("RETRY_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            retry_delay_ms: env::var("RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(250),
        }
    }

    /// Get cache freshness window as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Retry policy built from the configured count and delay, retrying on
    /// any store error code.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_count,
            retryable_codes: Vec::new(),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            environment: "dev-".to_string(),
            endpoint_url: None,
            region: "us-east-1".to_string(),
            cache_ttl_seconds: 600,
            retry_count: 3,
            retry_delay_ms: 10,
        }
    }

    #[test]
    fn test_cache_ttl_conversion() {
        assert_eq!(config().cache_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = config().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay, Duration::from_millis(10));
        assert!(policy.retryable_codes.is_empty());
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        env::remove_var("TABLEKIT_ENVIRONMENT");
        env::remove_var("environment");
        env::remove_var("AWS_ENDPOINT_URL");
        env::remove_var("CACHE_TTL_SECONDS");
        env::remove_var("RETRY_COUNT");
        env::remove_var("RETRY_DELAY_MS");

        let config = Config::from_env();

        assert_eq!(config.environment, "");
        assert_eq!(config.endpoint_url, None);
        assert_eq!(config.cache_ttl_seconds, 120);
        assert_eq!(config.retry_count, 1);
        assert_eq!(config.retry_delay_ms, 250);
    }
}
