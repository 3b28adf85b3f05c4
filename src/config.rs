/// Application-level constants
pub const APP_NAME: &str = "ContentLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen address for `contentlens serve`.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Default chat-completions endpoint of the trends provider.
pub const DEFAULT_TRENDS_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";

/// Default model requested from the trends provider.
pub const DEFAULT_TRENDS_MODEL: &str = "sonar";

/// Deadline applied to every provider call.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,contentlens=debug"
    } else {
        "info"
    }
}

/// Provider endpoints and credentials.
///
/// Nothing here is required at startup. A missing URL or key is reported by
/// the client that needs it, when its stage runs.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub analysis_base_url: Option<String>,
    pub analysis_api_key: Option<String>,
    pub trends_endpoint: String,
    pub trends_model: String,
    pub trends_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (environment, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_secs = match non_empty("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid PROVIDER_TIMEOUT_SECS, using default");
                DEFAULT_PROVIDER_TIMEOUT_SECS
            }),
            None => DEFAULT_PROVIDER_TIMEOUT_SECS,
        };

        Self {
            analysis_base_url: non_empty("ANALYSIS_BASE_URL"),
            analysis_api_key: non_empty("ANALYSIS_API_KEY"),
            trends_endpoint: non_empty("TRENDS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_TRENDS_ENDPOINT.to_string()),
            trends_model: non_empty("TRENDS_MODEL")
                .unwrap_or_else(|| DEFAULT_TRENDS_MODEL.to_string()),
            trends_api_key: non_empty("TRENDS_API_KEY"),
            timeout_secs,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("analysis_base_url", &self.analysis_base_url)
            .field("analysis_api_key", &self.analysis_api_key.as_ref().map(|_| "<set>"))
            .field("trends_endpoint", &self.trends_endpoint)
            .field("trends_model", &self.trends_model)
            .field("trends_api_key", &self.trends_api_key.as_ref().map(|_| "<set>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Listen address from `CONTENTLENS_BIND`, falling back to the default.
pub fn bind_addr_from_env() -> String {
    std::env::var("CONTENTLENS_BIND")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ProviderConfig::default();
        assert!(config.analysis_base_url.is_none());
        assert!(config.analysis_api_key.is_none());
        assert!(config.trends_api_key.is_none());
        assert_eq!(config.trends_endpoint, DEFAULT_TRENDS_ENDPOINT);
        assert_eq!(config.trends_model, DEFAULT_TRENDS_MODEL);
        assert_eq!(config.timeout_secs, DEFAULT_PROVIDER_TIMEOUT_SECS);
    }

    #[test]
    fn reads_all_variables() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("ANALYSIS_BASE_URL", "https://analysis.example"),
            ("ANALYSIS_API_KEY", "ak"),
            ("TRENDS_API_KEY", "tk"),
            ("TRENDS_ENDPOINT", "https://trends.example/chat"),
            ("TRENDS_MODEL", "sonar-pro"),
            ("PROVIDER_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.analysis_base_url.as_deref(), Some("https://analysis.example"));
        assert_eq!(config.analysis_api_key.as_deref(), Some("ak"));
        assert_eq!(config.trends_api_key.as_deref(), Some("tk"));
        assert_eq!(config.trends_endpoint, "https://trends.example/chat");
        assert_eq!(config.trends_model, "sonar-pro");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = ProviderConfig::from_lookup(lookup(&[("ANALYSIS_API_KEY", "   ")]));
        assert!(config.analysis_api_key.is_none());
    }

    #[test]
    fn invalid_timeout_falls_back() {
        let config = ProviderConfig::from_lookup(lookup(&[("PROVIDER_TIMEOUT_SECS", "soon")]));
        assert_eq!(config.timeout_secs, DEFAULT_PROVIDER_TIMEOUT_SECS);
    }

    #[test]
    fn debug_output_hides_keys() {
        let config = ProviderConfig::from_lookup(lookup(&[("ANALYSIS_API_KEY", "secret-key")]));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<set>"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
