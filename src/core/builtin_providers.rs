//! Built-in provider configuration
//!
//! Gateways known at build time, embedded from `builtin_providers.toml`.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROVIDER: &str = "openrouter";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    /// Sent as `HTTP-Referer`.
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    /// Identification headers this gateway expects alongside the bearer token.
    pub fn identity_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(referer) = &self.referer {
            headers.push(("HTTP-Referer", referer.clone()));
        }
        if let Some(title) = &self.title {
            headers.push(("X-Title", title.clone()));
        }
        headers
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<BuiltinProvider> {
    const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");

    let config: BuiltinProvidersConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_providers.toml");

    config.providers
}

/// Find a built-in provider by ID (case-insensitive)
pub fn find_builtin_provider(id: &str) -> Option<BuiltinProvider> {
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert!(provider_ids.contains(&DEFAULT_PROVIDER));
        assert!(provider_ids.contains(&"openai"));
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("OpenRouter").expect("openrouter");
        assert_eq!(provider.id, "openrouter");
        assert!(find_builtin_provider("nonexistent").is_none());
    }

    #[test]
    fn openrouter_sends_two_identification_headers() {
        let openrouter = find_builtin_provider("openrouter").unwrap();
        let names: Vec<&str> = openrouter
            .identity_headers()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(names, vec!["HTTP-Referer", "X-Title"]);

        let openai = find_builtin_provider("openai").unwrap();
        assert!(openai.identity_headers().is_empty());
    }

    #[test]
    fn test_provider_properties() {
        for provider in load_builtin_providers() {
            assert!(!provider.id.is_empty());
            assert!(!provider.display_name.is_empty());
            assert!(provider.base_url.starts_with("https://"));
        }
    }
}
