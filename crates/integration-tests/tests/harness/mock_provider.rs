//! Mock provider backend for integration tests
//!
//! Serves `OpenAI`-, Anthropic- and Google-shaped endpoints with canned
//! responses, as plain JSON or SSE depending on the request. When the
//! request offers tools the mock calls the first one with a `title`
//! argument.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

pub const BOOK_TITLE: &str = "The Name of the Wind";

/// A request as the mock received it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

struct MockState {
    request_count: AtomicU32,
    /// Requests to fail before answering normally
    fail_remaining: AtomicU32,
    fail_status: StatusCode,
    requests: Mutex<Vec<Recorded>>,
}

/// Mock provider server
pub struct MockProvider {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
    runtime: Option<Runtime>,
}

impl MockProvider {
    /// Start on the current runtime
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, StatusCode::OK).await
    }

    /// Start a mock that answers the first `n` requests with `status`
    pub async fn start_failing(n: u32, status: StatusCode) -> anyhow::Result<Self> {
        Self::start_inner(n, status).await
    }

    /// Start on a private runtime, for tests that drive blocking calls
    pub fn start_blocking() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let mut mock = runtime.block_on(Self::start())?;
        mock.runtime = Some(runtime);
        Ok(mock)
    }

    async fn start_inner(fail_count: u32, fail_status: StatusCode) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            request_count: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(fail_count),
            fail_status,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_openai))
            .route("/v1/messages", routing::post(handle_anthropic))
            .route("/v1/models/{call}", routing::post(handle_google))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            state,
            runtime: None,
        })
    }

    /// Base URL for every provider, `/v1` included
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Most recent request
    pub fn last_request(&self) -> Recorded {
        self.state
            .requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("at least one request")
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Handlers --

fn record(state: &MockState, path: String, headers: HeaderMap, body: &Value) -> Option<Response> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    state.requests.lock().unwrap().push(Recorded {
        path,
        headers,
        body: body.clone(),
    });

    let remaining = state.fail_remaining.load(Ordering::Relaxed);
    if remaining == 0 {
        return None;
    }
    state.fail_remaining.fetch_sub(1, Ordering::Relaxed);

    Some(
        (
            state.fail_status,
            Json(json!({"error": {"message": "mock server intentional failure", "type": "rate_limit_error"}})),
        )
            .into_response(),
    )
}

/// Name of the first offered tool, in any of the three wire formats
fn first_tool(body: &Value) -> Option<String> {
    let tool = body.get("tools")?.get(0)?;
    tool.pointer("/function/name")
        .or_else(|| tool.get("name"))
        .or_else(|| tool.pointer("/functionDeclarations/0/name"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

async fn handle_openai(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(failure) = record(&state, "/v1/chat/completions".to_owned(), headers, &body) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let tool = first_tool(&body);

    if body["stream"].as_bool().unwrap_or(false) {
        let chunk = |choices: Value| json!({"id": "chatcmpl-s", "model": model, "choices": choices});
        let mut events = Vec::new();
        if let Some(name) = &tool {
            let arguments = format!("{{\"title\": \"{BOOK_TITLE}\"}}");
            let (head, tail) = arguments.split_at(4);
            events.push(chunk(json!([{"index": 0, "delta": {"role": "assistant", "tool_calls": [
                {"index": 0, "id": "call_stream", "type": "function", "function": {"name": name, "arguments": head}}
            ]}}])));
            events.push(chunk(json!([{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": tail}}
            ]}}])));
            events.push(chunk(json!([{"index": 0, "delta": {}, "finish_reason": "tool_calls"}])));
        } else {
            for word in ["Hello ", "from ", "mock"] {
                events.push(chunk(json!([{"index": 0, "delta": {"content": word}}])));
            }
            events.push(chunk(json!([{"index": 0, "delta": {}, "finish_reason": "stop"}])));
        }
        let mut usage = chunk(json!([]));
        usage["usage"] = json!({"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15});
        events.push(usage);

        let mut sse: String = events.iter().map(|event| format!("data: {event}\n\n")).collect();
        sse.push_str("data: [DONE]\n\n");
        return event_stream(sse);
    }

    let message = if let Some(name) = &tool {
        json!({"role": "assistant", "content": null, "tool_calls": [{
            "id": "call_test_123",
            "type": "function",
            "function": {"name": name, "arguments": format!("{{\"title\":\"{BOOK_TITLE}\"}}")}
        }]})
    } else {
        json!({"role": "assistant", "content": "Hello from mock"})
    };

    let finish_reason = if tool.is_some() { "tool_calls" } else { "stop" };
    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

async fn handle_anthropic(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = record(&state, "/v1/messages".to_owned(), headers, &body) {
        return failure;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let tool = first_tool(&body);

    if body["stream"].as_bool().unwrap_or(false) {
        let mut events = vec![
            json!({"type": "message_start", "message": {
                "id": "msg_stream",
                "type": "message",
                "role": "assistant",
                "model": model,
                "content": [],
                "usage": {"input_tokens": 12, "output_tokens": 1}
            }}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me check"}}),
            json!({"type": "content_block_stop", "index": 0}),
        ];
        if let Some(name) = &tool {
            let block = json!({"type": "tool_use", "id": "toolu_stream", "name": name, "input": {}});
            events.push(json!({"type": "content_block_start", "index": 1, "content_block": block}));
            for partial_json in ["{\"title\": ".to_owned(), format!("\"{BOOK_TITLE}\"}}")] {
                let delta = json!({"type": "input_json_delta", "partial_json": partial_json});
                events.push(json!({"type": "content_block_delta", "index": 1, "delta": delta}));
            }
            events.push(json!({"type": "content_block_stop", "index": 1}));
        }
        let stop_reason = if tool.is_some() { "tool_use" } else { "end_turn" };
        events.push(json!({
            "type": "message_delta",
            "delta": {"stop_reason": stop_reason},
            "usage": {"output_tokens": 9}
        }));
        events.push(json!({"type": "message_stop"}));

        let sse: String = events
            .iter()
            .map(|event| format!("event: {}\ndata: {event}\n\n", event["type"].as_str().unwrap_or_default()))
            .collect();
        return event_stream(sse);
    }

    let content = if let Some(name) = &tool {
        json!([
            {"type": "text", "text": "Let me check"},
            {"type": "tool_use", "id": "toolu_test_123", "name": name, "input": {"title": BOOK_TITLE}}
        ])
    } else {
        json!([{"type": "text", "text": "Hello from mock"}])
    };

    Json(json!({
        "id": "msg_test_123",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": if tool.is_some() { "tool_use" } else { "end_turn" },
        "stop_sequence": null,
        "usage": {"input_tokens": 12, "output_tokens": 9}
    }))
    .into_response()
}

async fn handle_google(
    State(state): State<Arc<MockState>>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = record(&state, format!("/v1/models/{call}"), headers, &body) {
        return failure;
    }

    let parts = if let Some(name) = first_tool(&body) {
        json!([{"functionCall": {"name": name, "args": {"title": BOOK_TITLE}}}])
    } else {
        json!([{"text": "Hello from mock"}])
    };
    let response = json!({
        "candidates": [{"content": {"role": "model", "parts": parts}, "finishReason": "STOP", "index": 0}],
        "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10},
        "modelVersion": "gemini-1.5-flash-002"
    });

    if call.ends_with(":streamGenerateContent") {
        return event_stream(format!("data: {response}\r\n\r\n"));
    }
    Json(response).into_response()
}

fn event_stream(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
