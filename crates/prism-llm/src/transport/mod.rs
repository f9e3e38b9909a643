//! Transports and the client that drives them
//!
//! A transport sends a prepared provider payload and hands back the native
//! JSON, or a stream of native JSON chunks. Everything above it works on
//! those values and never sees HTTP or SDK types.

#[cfg(feature = "bedrock")]
mod bedrock;
mod http;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use prism_config::Config;
use serde_json::Value;
use tokio::runtime::{Builder, Handle, Runtime};

#[cfg(feature = "bedrock")]
pub use bedrock::BedrockTransport;
pub use http::HttpTransport;

use crate::error::LlmError;
use crate::provider::{Family, Provider};

/// Stream of native chunk payloads
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value, LlmError>> + Send>>;

/// One outbound provider call
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Target provider
    pub provider: Provider,
    /// Model identifier, also used for URL routing where the API needs it
    pub model: String,
    /// Native request body
    pub payload: Value,
}

/// Sends native payloads to a provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a non-streaming call and return the native response
    async fn create(&self, request: TransportRequest) -> Result<Value, LlmError>;

    /// Issue a streaming call and return the native chunks
    async fn stream(&self, request: TransportRequest) -> Result<ChunkStream, LlmError>;
}

/// Handle used to issue calls, async or blocking
///
/// A blocking client owns a single-threaded runtime and drives the
/// transport on it. Cloning is cheap and shares the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    runtime: Option<Arc<Runtime>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("blocking", &self.is_blocking())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Async client over a transport
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Async client over a shared transport
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            runtime: None,
        }
    }

    /// Client over the default transports for a configuration
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Ok(Self::new(DefaultTransport::new(config)?))
    }

    /// Client over the default transports, configured from `PRISM_CONFIG`
    /// or the conventional provider environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        let config = Config::discover().map_err(|e| LlmError::Configuration(format!("{e:#}")))?;
        Self::from_config(&config)
    }

    /// Same transport, driven by a private runtime for blocking calls
    pub fn into_blocking(self) -> Result<Self, LlmError> {
        if self.runtime.is_some() {
            return Ok(self);
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build blocking runtime: {e}")))?;

        Ok(Self {
            transport: self.transport,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Whether this client can serve blocking calls
    pub const fn is_blocking(&self) -> bool {
        self.runtime.is_some()
    }

    /// Underlying transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run a future to completion on the client's runtime
    pub(crate) fn block_on<F: Future>(&self, future: F) -> Result<F::Output, LlmError> {
        let Some(runtime) = &self.runtime else {
            return Err(LlmError::Configuration(
                "blocking call issued through an async client".to_owned(),
            ));
        };

        if Handle::try_current().is_ok() {
            return Err(LlmError::Configuration(
                "blocking call issued from inside an async runtime, use the async variant".to_owned(),
            ));
        }

        Ok(runtime.block_on(future))
    }
}

/// A client bound to one provider and model, as produced by call setup
#[derive(Debug, Clone)]
pub struct BoundCreate {
    client: Client,
    provider: Provider,
    model: String,
}

impl BoundCreate {
    pub(crate) fn new(client: Client, provider: Provider, model: impl Into<String>) -> Self {
        Self {
            client,
            provider,
            model: model.into(),
        }
    }

    /// Client the call goes through
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Target provider
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    fn request(&self, payload: Value) -> TransportRequest {
        TransportRequest {
            provider: self.provider,
            model: self.model.clone(),
            payload,
        }
    }

    /// Issue the call asynchronously
    pub async fn create_async(&self, payload: Value) -> Result<Value, LlmError> {
        self.client.transport.create(self.request(payload)).await
    }

    /// Issue the call on the client's blocking runtime
    pub fn create(&self, payload: Value) -> Result<Value, LlmError> {
        self.client.block_on(self.create_async(payload))?
    }

    /// Open a stream asynchronously
    pub async fn stream_async(&self, payload: Value) -> Result<ChunkStream, LlmError> {
        self.client.transport.stream(self.request(payload)).await
    }

    /// Open a stream on the client's blocking runtime
    pub fn stream(&self, payload: Value) -> Result<ChunkStream, LlmError> {
        self.client.block_on(self.stream_async(payload))?
    }
}

/// Routes Bedrock calls to the AWS SDK and everything else over HTTP
pub struct DefaultTransport {
    http: HttpTransport,
    #[cfg(feature = "bedrock")]
    bedrock: Option<prism_config::BedrockSettings>,
    #[cfg(feature = "bedrock")]
    bedrock_client: tokio::sync::OnceCell<BedrockTransport>,
}

impl DefaultTransport {
    /// Build the default transports for a configuration
    ///
    /// The Bedrock client is created on first use, since loading AWS
    /// configuration is itself asynchronous.
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        Ok(Self {
            http: HttpTransport::new(config)?,
            #[cfg(feature = "bedrock")]
            bedrock: config.providers.bedrock.clone(),
            #[cfg(feature = "bedrock")]
            bedrock_client: tokio::sync::OnceCell::new(),
        })
    }

    #[cfg(feature = "bedrock")]
    async fn bedrock(&self) -> Result<&BedrockTransport, LlmError> {
        self.bedrock_client
            .get_or_try_init(|| async {
                let settings = self
                    .bedrock
                    .as_ref()
                    .ok_or_else(|| LlmError::Configuration("no bedrock region configured".to_owned()))?;
                Ok(BedrockTransport::new(settings).await)
            })
            .await
    }
}

#[async_trait]
impl Transport for DefaultTransport {
    async fn create(&self, request: TransportRequest) -> Result<Value, LlmError> {
        match request.provider.family() {
            #[cfg(feature = "bedrock")]
            Family::Bedrock => self.bedrock().await?.create(request).await,
            #[cfg(not(feature = "bedrock"))]
            Family::Bedrock => Err(bedrock_disabled()),
            _ => self.http.create(request).await,
        }
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkStream, LlmError> {
        match request.provider.family() {
            #[cfg(feature = "bedrock")]
            Family::Bedrock => self.bedrock().await?.stream(request).await,
            #[cfg(not(feature = "bedrock"))]
            Family::Bedrock => Err(bedrock_disabled()),
            _ => self.http.stream(request).await,
        }
    }
}

#[cfg(not(feature = "bedrock"))]
fn bedrock_disabled() -> LlmError {
    LlmError::Configuration("bedrock support is not compiled in, enable the `bedrock` feature".to_owned())
}
