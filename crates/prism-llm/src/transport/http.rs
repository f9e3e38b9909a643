//! HTTP transport for the JSON and SSE provider APIs

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use indexmap::IndexMap;
use prism_config::{Config, ProviderSettings, ProvidersConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{ChunkStream, Transport, TransportRequest};
use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicErrorResponse;
use crate::protocol::google::GoogleErrorResponse;
use crate::protocol::openai::OpenAiErrorResponse;
use crate::provider::{Family, Provider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
const LITELLM_BASE_URL: &str = "http://localhost:4000/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Transport for every provider reachable over plain HTTP
pub struct HttpTransport {
    client: Client,
    providers: ProvidersConfig,
}

/// Credentials attached to a request
enum Auth<'a> {
    Bearer(&'a SecretString),
    Header(&'static str, &'a SecretString),
    None,
}

struct Endpoint<'a> {
    url: String,
    auth: Auth<'a>,
    headers: Option<&'a IndexMap<String, String>>,
}

impl HttpTransport {
    /// Create from configuration
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.http.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.http.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            providers: config.providers.clone(),
        })
    }

    fn endpoint(&self, provider: Provider, model: &str, stream: bool) -> Result<Endpoint<'_>, LlmError> {
        let providers = &self.providers;
        match provider {
            Provider::OpenAi => compatible(provider, providers.openai.as_ref(), OPENAI_BASE_URL, true),
            Provider::Groq => compatible(provider, providers.groq.as_ref(), GROQ_BASE_URL, true),
            Provider::Mistral => compatible(provider, providers.mistral.as_ref(), MISTRAL_BASE_URL, true),
            Provider::LiteLlm => compatible(provider, providers.litellm.as_ref(), LITELLM_BASE_URL, false),
            Provider::Azure => {
                let azure = providers
                    .azure
                    .as_ref()
                    .ok_or_else(|| LlmError::Configuration("no azure endpoint configured".to_owned()))?;
                let base = azure.endpoint.as_str().trim_end_matches('/');
                Ok(Endpoint {
                    url: format!(
                        "{base}/openai/deployments/{model}/chat/completions?api-version={}",
                        azure.api_version
                    ),
                    auth: azure
                        .api_key
                        .as_ref()
                        .map_or(Auth::None, |key| Auth::Header("api-key", key)),
                    headers: Some(&azure.headers),
                })
            }
            Provider::Anthropic => {
                let settings = providers.anthropic.as_ref();
                let base = base_url(settings, ANTHROPIC_BASE_URL);
                Ok(Endpoint {
                    url: format!("{base}/messages"),
                    auth: api_key(provider, settings, base == ANTHROPIC_BASE_URL)?
                        .map_or(Auth::None, |key| Auth::Header("x-api-key", key)),
                    headers: settings.map(|s| &s.headers),
                })
            }
            Provider::Google => {
                let settings = providers.google.as_ref();
                let base = base_url(settings, GOOGLE_BASE_URL);
                Ok(Endpoint {
                    url: format!("{base}/models/{model}:{}", google_method(stream)),
                    auth: api_key(provider, settings, base == GOOGLE_BASE_URL)?
                        .map_or(Auth::None, |key| Auth::Header("x-goog-api-key", key)),
                    headers: settings.map(|s| &s.headers),
                })
            }
            Provider::Vertex => {
                let vertex = providers
                    .vertex
                    .as_ref()
                    .ok_or_else(|| LlmError::Configuration("no vertex project configured".to_owned()))?;
                let base = vertex.base_url.as_ref().map_or_else(
                    || vertex_base_url(&vertex.location),
                    |url| url.as_str().trim_end_matches('/').to_owned(),
                );
                Ok(Endpoint {
                    url: format!(
                        "{base}/projects/{}/locations/{}/publishers/google/models/{model}:{}",
                        vertex.project,
                        vertex.location,
                        google_method(stream)
                    ),
                    auth: vertex.access_token.as_ref().map_or(Auth::None, Auth::Bearer),
                    headers: None,
                })
            }
            Provider::Bedrock => Err(LlmError::Configuration(
                "bedrock is served by the AWS SDK transport".to_owned(),
            )),
        }
    }

    fn prepare(&self, request: &TransportRequest, stream: bool) -> Result<RequestBuilder, LlmError> {
        let endpoint = self.endpoint(request.provider, &request.model, stream)?;

        let mut builder = self.client.post(&endpoint.url).json(&request.payload);
        if let Some(headers) = endpoint.headers {
            builder = builder.headers(header_map(headers)?);
        }
        if request.provider == Provider::Anthropic {
            builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
        }

        builder = match endpoint.auth {
            Auth::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            Auth::Header(name, key) => builder.header(name, key.expose_secret()),
            Auth::None => builder,
        };

        tracing::debug!(provider = %request.provider, url = %endpoint.url, stream, "sending provider request");
        Ok(builder)
    }

    async fn send(&self, request: &TransportRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let provider = request.provider;
        let response = self.prepare(request, stream)?.send().await.map_err(|e| {
            tracing::error!(provider = %provider, error = %e, "provider request failed");
            LlmError::transport(provider, e.to_string())
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(provider = %provider, status = %status, "provider returned error");

        Err(LlmError::ProviderTransport {
            provider,
            status: Some(status.as_u16()),
            message: error_message(provider, &body).unwrap_or_else(|| status.to_string()),
            body: Some(body),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn create(&self, request: TransportRequest) -> Result<Value, LlmError> {
        let provider = request.provider;
        let response = self.send(&request, false).await?;

        response
            .json()
            .await
            .map_err(|e| LlmError::transport(provider, format!("failed to parse response: {e}")))
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkStream, LlmError> {
        let provider = request.provider;
        let response = self.send(&request, true).await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |result| async move {
                match result {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() || data == "[DONE]" {
                            return None;
                        }
                        match serde_json::from_str::<Value>(data) {
                            Ok(chunk) => Some(Ok(chunk)),
                            Err(e) => {
                                tracing::debug!(
                                    provider = %provider,
                                    error = %e,
                                    data = %data,
                                    "skipping unparseable SSE chunk"
                                );
                                None
                            }
                        }
                    }
                    Err(e) => Some(Err(LlmError::transport(provider, format!("stream interrupted: {e}")))),
                }
            });

        Ok(Box::pin(chunks))
    }
}

fn compatible<'a>(
    provider: Provider,
    settings: Option<&'a ProviderSettings>,
    default_base: &str,
    key_required: bool,
) -> Result<Endpoint<'a>, LlmError> {
    let base = base_url(settings, default_base);
    let key = api_key(provider, settings, key_required && base == default_base)?;

    Ok(Endpoint {
        url: format!("{base}/chat/completions"),
        auth: key.map_or(Auth::None, Auth::Bearer),
        headers: settings.map(|s| &s.headers),
    })
}

fn base_url(settings: Option<&ProviderSettings>, default: &str) -> String {
    settings
        .and_then(|s| s.base_url.as_ref())
        .map_or(default, |url| url.as_str())
        .trim_end_matches('/')
        .to_owned()
}

/// Configured key, required when talking to the vendor's own endpoint
fn api_key(
    provider: Provider,
    settings: Option<&ProviderSettings>,
    required: bool,
) -> Result<Option<&SecretString>, LlmError> {
    match settings.and_then(|s| s.api_key.as_ref()) {
        Some(key) => Ok(Some(key)),
        None if required => Err(LlmError::Configuration(format!("no API key configured for {provider}"))),
        None => Ok(None),
    }
}

const fn google_method(stream: bool) -> &'static str {
    if stream {
        "streamGenerateContent?alt=sse"
    } else {
        "generateContent"
    }
}

fn vertex_base_url(location: &str) -> String {
    if location == "global" {
        "https://aiplatform.googleapis.com/v1".to_owned()
    } else {
        format!("https://{location}-aiplatform.googleapis.com/v1")
    }
}

fn header_map(headers: &IndexMap<String, String>) -> Result<HeaderMap, LlmError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::Configuration(format!("invalid header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::Configuration(format!("invalid value for header `{name}`: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Pull the human-readable message out of a provider error body
fn error_message(provider: Provider, body: &str) -> Option<String> {
    match provider.family() {
        Family::OpenAi => serde_json::from_str::<OpenAiErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
        Family::Anthropic => serde_json::from_str::<AnthropicErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
        Family::Google => serde_json::from_str::<GoogleErrorResponse>(body)
            .ok()
            .map(|e| e.error.message),
        Family::Bedrock => None,
    }
}
