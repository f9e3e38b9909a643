use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default Azure OpenAI REST API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Default Vertex AI location
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// Credentials and endpoints for every supported provider
///
/// A provider left unset falls back to its conventional environment
/// variables when a transport is built for it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<ProviderSettings>,
    #[serde(default)]
    pub anthropic: Option<ProviderSettings>,
    #[serde(default)]
    pub google: Option<ProviderSettings>,
    #[serde(default)]
    pub groq: Option<ProviderSettings>,
    #[serde(default)]
    pub mistral: Option<ProviderSettings>,
    #[serde(default)]
    pub litellm: Option<ProviderSettings>,
    #[serde(default)]
    pub azure: Option<AzureSettings>,
    #[serde(default)]
    pub vertex: Option<VertexSettings>,
    #[serde(default)]
    pub bedrock: Option<BedrockSettings>,
}

/// Settings shared by the key-authenticated HTTP providers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Azure OpenAI deployment settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureSettings {
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: Url,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// Google Vertex AI settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertexSettings {
    /// GCP project id
    pub project: String,
    #[serde(default = "default_vertex_location")]
    pub location: String,
    /// OAuth access token sent as a bearer credential
    #[serde(default)]
    pub access_token: Option<SecretString>,
    /// Endpoint override, defaults to the regional aiplatform host
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// AWS Bedrock settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BedrockSettings {
    /// AWS region
    pub region: String,
    /// Access key ID (optional, uses default credential chain if absent)
    #[serde(default)]
    pub access_key_id: Option<SecretString>,
    /// Secret access key
    #[serde(default)]
    pub secret_access_key: Option<SecretString>,
    #[serde(default)]
    pub session_token: Option<SecretString>,
}

fn default_azure_api_version() -> String {
    DEFAULT_AZURE_API_VERSION.to_owned()
}

fn default_vertex_location() -> String {
    DEFAULT_VERTEX_LOCATION.to_owned()
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn secret(name: &str) -> Option<SecretString> {
    var(name).map(SecretString::from)
}

fn url(name: &str) -> Option<Url> {
    let raw = var(name)?;
    match raw.parse() {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(variable = name, error = %e, "ignoring malformed URL in environment");
            None
        }
    }
}

fn keyed(key_var: &str, url_var: &str) -> Option<ProviderSettings> {
    let api_key = secret(key_var);
    let base_url = url(url_var);

    if api_key.is_none() && base_url.is_none() {
        return None;
    }

    Some(ProviderSettings {
        api_key,
        base_url,
        headers: IndexMap::new(),
    })
}

impl ProvidersConfig {
    /// Build provider settings from the conventional environment variables
    pub fn from_env() -> Self {
        let google = keyed("GOOGLE_API_KEY", "GOOGLE_BASE_URL").or_else(|| keyed("GEMINI_API_KEY", "GOOGLE_BASE_URL"));

        let azure = url("AZURE_ENDPOINT").map(|endpoint| AzureSettings {
            api_key: secret("AZURE_API_KEY"),
            endpoint,
            api_version: var("AZURE_API_VERSION").unwrap_or_else(default_azure_api_version),
            headers: IndexMap::new(),
        });

        let vertex = var("GOOGLE_CLOUD_PROJECT").map(|project| VertexSettings {
            project,
            location: var("VERTEX_LOCATION").unwrap_or_else(default_vertex_location),
            access_token: secret("VERTEX_ACCESS_TOKEN"),
            base_url: None,
        });

        let bedrock = var("AWS_REGION")
            .or_else(|| var("AWS_DEFAULT_REGION"))
            .map(|region| BedrockSettings {
                region,
                access_key_id: secret("AWS_ACCESS_KEY_ID"),
                secret_access_key: secret("AWS_SECRET_ACCESS_KEY"),
                session_token: secret("AWS_SESSION_TOKEN"),
            });

        Self {
            openai: keyed("OPENAI_API_KEY", "OPENAI_BASE_URL"),
            anthropic: keyed("ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL"),
            google,
            groq: keyed("GROQ_API_KEY", "GROQ_BASE_URL"),
            mistral: keyed("MISTRAL_API_KEY", "MISTRAL_BASE_URL"),
            litellm: keyed("LITELLM_API_KEY", "LITELLM_BASE_URL"),
            azure,
            vertex,
            bedrock,
        }
    }

    /// Fill every unset provider from the environment, keeping explicit settings
    pub fn with_env_fallback(mut self) -> Self {
        let env = Self::from_env();

        self.openai = self.openai.or(env.openai);
        self.anthropic = self.anthropic.or(env.anthropic);
        self.google = self.google.or(env.google);
        self.groq = self.groq.or(env.groq);
        self.mistral = self.mistral.or(env.mistral);
        self.litellm = self.litellm.or(env.litellm);
        self.azure = self.azure.or(env.azure);
        self.vertex = self.vertex.or(env.vertex);
        self.bedrock = self.bedrock.or(env.bedrock);

        self
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const PROVIDER_VARS: [&str; 18] = [
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_BASE_URL",
        "GOOGLE_API_KEY",
        "GEMINI_API_KEY",
        "GOOGLE_BASE_URL",
        "GROQ_API_KEY",
        "MISTRAL_API_KEY",
        "LITELLM_BASE_URL",
        "AZURE_ENDPOINT",
        "AZURE_API_KEY",
        "AZURE_API_VERSION",
        "GOOGLE_CLOUD_PROJECT",
        "VERTEX_LOCATION",
        "AWS_REGION",
        "AWS_DEFAULT_REGION",
        "AWS_ACCESS_KEY_ID",
    ];

    fn with_clean_env(set: &[(&str, &str)], f: impl FnOnce()) {
        let mut vars: Vec<(&str, Option<&str>)> = PROVIDER_VARS.iter().map(|name| (*name, None)).collect();
        for (name, value) in set {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, Some(*value)));
        }
        temp_env::with_vars(vars, f);
    }

    #[test]
    fn empty_environment_configures_nothing() {
        with_clean_env(&[], || {
            let providers = ProvidersConfig::from_env();
            assert!(providers.openai.is_none());
            assert!(providers.azure.is_none());
            assert!(providers.bedrock.is_none());
        });
    }

    #[test]
    fn reads_conventional_keys() {
        with_clean_env(
            &[("OPENAI_API_KEY", "sk-test"), ("GEMINI_API_KEY", "g-test"), ("AWS_DEFAULT_REGION", "eu-west-1")],
            || {
                let providers = ProvidersConfig::from_env();

                let openai = providers.openai.unwrap();
                assert_eq!(openai.api_key.unwrap().expose_secret(), "sk-test");
                assert!(openai.base_url.is_none());

                assert_eq!(providers.google.unwrap().api_key.unwrap().expose_secret(), "g-test");
                assert_eq!(providers.bedrock.unwrap().region, "eu-west-1");
            },
        );
    }

    #[test]
    fn azure_requires_endpoint() {
        with_clean_env(&[("AZURE_API_KEY", "az")], || {
            assert!(ProvidersConfig::from_env().azure.is_none());
        });

        with_clean_env(&[("AZURE_API_KEY", "az"), ("AZURE_ENDPOINT", "https://r.openai.azure.com")], || {
            let azure = ProvidersConfig::from_env().azure.unwrap();
            assert_eq!(azure.api_version, DEFAULT_AZURE_API_VERSION);
            assert_eq!(azure.endpoint.host_str(), Some("r.openai.azure.com"));
        });
    }

    #[test]
    fn malformed_base_url_is_ignored() {
        with_clean_env(&[("LITELLM_BASE_URL", "not a url")], || {
            assert!(ProvidersConfig::from_env().litellm.is_none());
        });
    }

    #[test]
    fn explicit_settings_win_over_environment() {
        with_clean_env(&[("OPENAI_API_KEY", "from-env"), ("ANTHROPIC_API_KEY", "anthropic-env")], || {
            let explicit = ProvidersConfig {
                openai: Some(ProviderSettings {
                    api_key: Some(SecretString::from("from-file")),
                    ..ProviderSettings::default()
                }),
                ..ProvidersConfig::default()
            };

            let merged = explicit.with_env_fallback();
            assert_eq!(merged.openai.unwrap().api_key.unwrap().expose_secret(), "from-file");
            assert_eq!(merged.anthropic.unwrap().api_key.unwrap().expose_secret(), "anthropic-env");
        });
    }

    #[test]
    fn vertex_defaults_location() {
        let toml = r#"
            project = "my-project"
        "#;
        let vertex: VertexSettings = toml::from_str(toml).unwrap();
        assert_eq!(vertex.location, DEFAULT_VERTEX_LOCATION);
        assert!(vertex.access_token.is_none());
    }
}
