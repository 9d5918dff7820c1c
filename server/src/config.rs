// Configuration for the server, read from the environment

use std::time::Duration;

use tts_core::{RelayConfig, DEFAULT_CHANNEL_CAPACITY};

/// Owner used for voice records until requests carry an authenticated user.
pub const DEFAULT_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Upper bound on one streamed response. Unset means no deadline.
    pub stream_timeout_secs: Option<u64>,
    pub relay_channel_capacity: usize,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: Option<String>,
    pub elevenlabs_model_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub default_user_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            stream_timeout_secs: None,
            relay_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            elevenlabs_api_key: None,
            elevenlabs_base_url: None,
            elevenlabs_model_id: None,
            supabase_url: None,
            supabase_service_key: None,
            default_user_id: DEFAULT_USER_ID.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = var("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = var("RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = var("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let stream_timeout_secs = var("STREAM_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0);

        let relay_channel_capacity = var("RELAY_CHANNEL_CAPACITY")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.relay_channel_capacity);

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            stream_timeout_secs,
            relay_channel_capacity,
            elevenlabs_api_key: var("ELEVENLABS_API_KEY"),
            elevenlabs_base_url: var("ELEVENLABS_BASE_URL"),
            elevenlabs_model_id: var("ELEVENLABS_MODEL_ID"),
            supabase_url: var("SUPABASE_URL"),
            supabase_service_key: var("SUPABASE_SERVICE_ROLE_KEY"),
            default_user_id: var("DEFAULT_USER_ID").unwrap_or(defaults.default_user_id),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Requests per minute, at least one.
    pub fn rate_limit(&self) -> u32 {
        self.rate_limit_per_minute.max(1)
    }

    /// Milliseconds between replenished rate limit tokens, at least one.
    pub fn rate_limit_interval_ms(&self) -> u64 {
        (60_000 / u64::from(self.rate_limit())).max(1)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_secs.map(Duration::from_secs)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            channel_capacity: self.relay_channel_capacity.max(1),
            stream_timeout: self.stream_timeout(),
        }
    }

    /// Supabase URL and service key, when both are configured.
    pub fn supabase(&self) -> Option<(String, String)> {
        match (&self.supabase_url, &self.supabase_service_key) {
            (Some(url), Some(key)) => Some((url.clone(), key.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8085);
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.relay_channel_capacity, 1);
        assert!(config.stream_timeout().is_none());
        assert!(config.supabase().is_none());
        assert_eq!(config.default_user_id, DEFAULT_USER_ID);
    }

    #[test]
    fn test_parses_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("STREAM_TIMEOUT_SECS", "30"),
            ("RELAY_CHANNEL_CAPACITY", "4"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "secret"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.stream_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.relay_config().channel_capacity, 4);
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
        assert!(config.supabase().is_some());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("RELAY_CHANNEL_CAPACITY", "0"),
            ("STREAM_TIMEOUT_SECS", "0"),
            ("ELEVENLABS_API_KEY", "   "),
            ("SUPABASE_URL", "https://x.supabase.co"),
        ]);
        assert_eq!(config.port, 8085);
        assert_eq!(config.relay_channel_capacity, 1);
        assert!(config.stream_timeout_secs.is_none());
        assert!(config.elevenlabs_api_key.is_none());
        // A URL without a key is not enough to use Supabase.
        assert!(config.supabase().is_none());
    }

    #[test]
    fn test_rate_limit_interval_bounds() {
        assert_eq!(config_from(&[]).rate_limit_interval_ms(), 1000);
        assert_eq!(config_from(&[("RATE_LIMIT_PER_MINUTE", "0")]).rate_limit(), 1);
        assert_eq!(
            config_from(&[("RATE_LIMIT_PER_MINUTE", "0")]).rate_limit_interval_ms(),
            60_000
        );
        let burst = config_from(&[("RATE_LIMIT_PER_MINUTE", "120000")]);
        assert_eq!(burst.rate_limit_interval_ms(), 1);
        assert_eq!(burst.rate_limit(), 120_000);
    }
}
