//! Configuration pointing every HTTP provider at a mock backend

use indexmap::IndexMap;
use prism_config::{Config, ProviderSettings, ProvidersConfig};
use prism_llm::Client;
use secrecy::SecretString;

fn settings(base_url: &str) -> ProviderSettings {
    ProviderSettings {
        api_key: Some(SecretString::from("test-key")),
        base_url: Some(base_url.parse().expect("valid URL")),
        headers: IndexMap::from([("x-test-suite".to_owned(), "prism".to_owned())]),
    }
}

/// Config with the `OpenAI`, Groq, Anthropic and Google providers on `base_url`
pub fn mock_config(base_url: &str) -> Config {
    Config {
        providers: ProvidersConfig {
            openai: Some(settings(base_url)),
            groq: Some(settings(base_url)),
            anthropic: Some(settings(base_url)),
            google: Some(settings(base_url)),
            ..ProvidersConfig::default()
        },
        ..Config::default()
    }
}

/// Async client over the default transports
pub fn mock_client(base_url: &str) -> Client {
    Client::from_config(&mock_config(base_url)).expect("client builds")
}
