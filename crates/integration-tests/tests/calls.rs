mod harness;

use harness::config::mock_client;
use harness::mock_provider::{BOOK_TITLE, MockProvider};
use prism_llm::{FinishReason, Message, Tool, ToolDefinition, anthropic, google, groq, openai};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

/// Returns the author of a book given its title
#[derive(Debug, Deserialize, JsonSchema)]
struct GetBookAuthor {
    title: String,
}

impl Tool for GetBookAuthor {
    type Output = String;

    fn call(&self) -> anyhow::Result<String> {
        Ok(if self.title == BOOK_TITLE {
            "Patrick Rothfuss".to_owned()
        } else {
            "Unknown".to_owned()
        })
    }
}

fn author_tool() -> ToolDefinition {
    ToolDefinition::from_tool::<GetBookAuthor>().named("get_book_author")
}

// -- Text calls --

#[tokio::test]
async fn openai_text_call() {
    harness::init_tracing();
    let mock = MockProvider::start().await.unwrap();

    let recommend = openai::call("gpt-4o-mini")
        .client(mock_client(&mock.base_url()))
        .function(|genre: &'static str| format!("Recommend a {genre} book"));
    let response = recommend.invoke_async("fantasy").await.unwrap();

    assert_eq!(response.content(), "Hello from mock");
    assert_eq!(response.finish_reason(), FinishReason::Stop);
    assert_eq!(response.input_tokens(), Some(10));
    assert_eq!(response.output_tokens(), Some(5));
    assert_eq!(response.model(), "gpt-4o-mini");

    let request = mock.last_request();
    assert_eq!(request.path, "/v1/chat/completions");
    assert_eq!(request.headers["authorization"], "Bearer test-key");
    assert_eq!(request.headers["x-test-suite"], "prism");
    assert_eq!(
        request.body["messages"],
        json!([{"role": "user", "content": "Recommend a fantasy book"}])
    );
}

#[tokio::test]
async fn anthropic_text_call_hoists_system_message() {
    let mock = MockProvider::start().await.unwrap();

    let recommend = anthropic::call("claude-3-5-sonnet-20240620")
        .client(mock_client(&mock.base_url()))
        .function(|genre: &'static str| {
            vec![
                Message::system("You are a librarian."),
                Message::user(format!("Recommend a {genre} book")),
            ]
        });
    let response = recommend.invoke_async("mystery").await.unwrap();

    assert_eq!(response.content(), "Hello from mock");
    assert_eq!(response.finish_reason(), FinishReason::Stop);
    assert_eq!(response.usage().unwrap().total_tokens(), 21);

    let request = mock.last_request();
    assert_eq!(request.headers["x-api-key"], "test-key");
    assert!(request.headers.contains_key("anthropic-version"));
    assert_eq!(request.body["system"], "You are a librarian.");
    assert_eq!(request.body["messages"].as_array().unwrap().len(), 1);
    assert!(request.body["max_tokens"].is_u64());
}

#[tokio::test]
async fn google_text_call() {
    let mock = MockProvider::start().await.unwrap();

    let recommend = google::call("gemini-1.5-flash")
        .client(mock_client(&mock.base_url()))
        .function(|genre: &'static str| format!("Recommend a {genre} book"));
    let response = recommend.invoke_async("horror").await.unwrap();

    assert_eq!(response.content(), "Hello from mock");
    assert_eq!(response.finish_reason(), FinishReason::Stop);
    assert_eq!(response.model(), "gemini-1.5-flash-002");

    let request = mock.last_request();
    assert_eq!(request.path, "/v1/models/gemini-1.5-flash:generateContent");
    assert_eq!(request.headers["x-goog-api-key"], "test-key");
    assert_eq!(request.body["contents"][0]["role"], "user");
    assert_eq!(request.body["contents"][0]["parts"][0]["text"], "Recommend a horror book");
}

#[tokio::test]
async fn groq_shares_the_openai_wire_format() {
    let mock = MockProvider::start().await.unwrap();

    let response = groq::call("llama-3.1-8b-instant")
        .client(mock_client(&mock.base_url()))
        .function(|(): ()| "Say hello")
        .invoke_async(())
        .await
        .unwrap();

    assert_eq!(response.content(), "Hello from mock");
    assert_eq!(mock.last_request().path, "/v1/chat/completions");
    assert_eq!(mock.request_count(), 1);
}

#[test]
fn blocking_invoke_from_plain_thread() {
    let mock = MockProvider::start_blocking().unwrap();

    let recommend = openai::call("gpt-4o-mini")
        .client(mock_client(&mock.base_url()))
        .function(|genre: &'static str| format!("Recommend a {genre} book"));
    let response = recommend.invoke("fantasy").unwrap();

    assert_eq!(response.content(), "Hello from mock");
    assert_eq!(mock.request_count(), 1);
}

// -- Tools --

#[tokio::test]
async fn openai_tool_call_round_trip() {
    let mock = MockProvider::start().await.unwrap();

    let identify = openai::call("gpt-4o-mini")
        .client(mock_client(&mock.base_url()))
        .tool(author_tool())
        .function(|title: &'static str| format!("Who wrote {title}?"));
    let response = identify.invoke_async(BOOK_TITLE).await.unwrap();

    assert_eq!(response.finish_reason(), FinishReason::ToolUse);
    let tool = response.tool().unwrap().unwrap();
    assert_eq!(tool.name(), "get_book_author");
    assert_eq!(tool.id(), "call_test_123");
    assert_eq!(tool.call().unwrap(), json!("Patrick Rothfuss"));
    assert_eq!(tool.tool_call(), &response.response()["choices"][0]["message"]["tool_calls"][0]);

    let output = tool.call().unwrap();
    let follow_up = response.tool_message_params(&[(tool, output)]);
    assert_eq!(follow_up.len(), 1);

    let request = mock.last_request();
    assert_eq!(request.body["tools"][0]["type"], "function");
    assert_eq!(request.body["tools"][0]["function"]["name"], "get_book_author");
}

#[tokio::test]
async fn anthropic_tool_call_round_trip() {
    let mock = MockProvider::start().await.unwrap();

    let identify = anthropic::call("claude-3-5-sonnet-20240620")
        .client(mock_client(&mock.base_url()))
        .tool(author_tool())
        .function(|title: &'static str| format!("Who wrote {title}?"));
    let response = identify.invoke_async(BOOK_TITLE).await.unwrap();

    assert_eq!(response.content(), "Let me check");
    let tool = response.tool().unwrap().unwrap();
    assert_eq!(tool.id(), "toolu_test_123");
    assert_eq!(tool.call().unwrap(), json!("Patrick Rothfuss"));
    assert_eq!(tool.tool_call(), &response.response()["content"][1]);

    let request = mock.last_request();
    assert_eq!(request.body["tools"][0]["name"], "get_book_author");
    assert!(request.body["tools"][0]["input_schema"].is_object());
}

#[tokio::test]
async fn google_tool_call_round_trip() {
    let mock = MockProvider::start().await.unwrap();

    let identify = google::call("gemini-1.5-flash")
        .client(mock_client(&mock.base_url()))
        .tool(author_tool())
        .function(|title: &'static str| format!("Who wrote {title}?"));
    let response = identify.invoke_async(BOOK_TITLE).await.unwrap();

    let tool = response.tool().unwrap().unwrap();
    assert_eq!(tool.name(), "get_book_author");
    assert_eq!(tool.call().unwrap(), json!("Patrick Rothfuss"));

    let request = mock.last_request();
    assert_eq!(
        request.body["tools"][0]["functionDeclarations"][0]["name"],
        "get_book_author"
    );
}

// -- Extraction --

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Book {
    title: String,
}

#[tokio::test]
async fn extraction_forces_the_response_model() {
    let mock = MockProvider::start().await.unwrap();

    let book: Book = anthropic::call("claude-3-5-sonnet-20240620")
        .client(mock_client(&mock.base_url()))
        .function(|text: &'static str| format!("Extract the book from: {text}"))
        .extract_async(BOOK_TITLE)
        .await
        .unwrap();

    assert_eq!(book, Book {
        title: BOOK_TITLE.to_owned()
    });

    let request = mock.last_request();
    assert_eq!(request.body["tools"].as_array().unwrap().len(), 1);
    assert_eq!(request.body["tools"][0]["name"], "Book");
    assert_eq!(request.body["tool_choice"], json!({"type": "tool", "name": "Book"}));
}
