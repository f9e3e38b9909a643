use std::path::Path;

use secrecy::ExposeSecret;

use crate::{Config, ProvidersConfig};

/// Environment variable naming the configuration file to load
pub const CONFIG_PATH_ENV: &str = "PRISM_CONFIG";

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result. Providers missing from the
    /// file are filled from the environment.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let mut config = Self::from_toml(&raw)?;
        config.providers = config.providers.with_env_fallback();

        tracing::debug!(path = %path.display(), "loaded configuration");

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Resolve configuration for a call that was not given a client
    ///
    /// Uses the file named by `PRISM_CONFIG` when set, otherwise the
    /// conventional provider environment variables.
    pub fn discover() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self {
                providers: ProvidersConfig::from_env(),
                ..Self::default()
            }),
        }
    }

    /// Validate that the configuration is internally consistent
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_endpoints()?;
        self.validate_bedrock()?;
        self.validate_vertex()?;
        Ok(())
    }

    fn validate_endpoints(&self) -> anyhow::Result<()> {
        let providers = &self.providers;
        let keyed = [
            ("openai", providers.openai.as_ref()),
            ("anthropic", providers.anthropic.as_ref()),
            ("google", providers.google.as_ref()),
            ("groq", providers.groq.as_ref()),
            ("mistral", providers.mistral.as_ref()),
            ("litellm", providers.litellm.as_ref()),
        ];

        for (name, settings) in keyed {
            if let Some(url) = settings.and_then(|s| s.base_url.as_ref())
                && !matches!(url.scheme(), "http" | "https")
            {
                anyhow::bail!("providers.{name}.base_url must use http or https, got `{}`", url.scheme());
            }
        }

        if let Some(azure) = &providers.azure {
            if azure.api_version.trim().is_empty() {
                anyhow::bail!("providers.azure.api_version must not be empty");
            }
            if !matches!(azure.endpoint.scheme(), "http" | "https") {
                anyhow::bail!("providers.azure.endpoint must use http or https");
            }
        }

        Ok(())
    }

    fn validate_bedrock(&self) -> anyhow::Result<()> {
        let Some(bedrock) = &self.providers.bedrock else {
            return Ok(());
        };

        if bedrock.region.trim().is_empty() {
            anyhow::bail!("providers.bedrock.region must not be empty");
        }

        match (&bedrock.access_key_id, &bedrock.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("providers.bedrock requires both access_key_id and secret_access_key, or neither")
            }
            (Some(id), Some(_)) if id.expose_secret().is_empty() => {
                anyhow::bail!("providers.bedrock.access_key_id must not be empty")
            }
            _ => Ok(()),
        }
    }

    fn validate_vertex(&self) -> anyhow::Result<()> {
        if let Some(vertex) = &self.providers.vertex
            && (vertex.project.trim().is_empty() || vertex.location.trim().is_empty())
        {
            anyhow::bail!("providers.vertex requires a project and a location");
        }

        Ok(())
    }
}
