//! Wire-level tests for the OpenAI-compatible streaming client.

use futures::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drover::accumulate::ToolCallAccumulator;
use drover::client::{ChatStreamRequest, ModelClient, OpenAiCompatClient, ToolSchema};
use drover::error::DroverError;
use drover::types::{ChatMessage, FinishReason, StreamChunk};

const SSE_BODY: &str = "\
data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{\\\"q\\\":\"}}]},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"x\\\"}\"}}]},\"finish_reason\":null}]}\n\
\n\
data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\
\n\
data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":7}}\n\
\n\
data: [DONE]\n\
\n";

async fn collect(client: &OpenAiCompatClient, request: &ChatStreamRequest) -> Vec<StreamChunk> {
    let mut stream = client.chat_stream(request).await.unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.unwrap());
    }
    chunks
}

#[tokio::test]
async fn streams_content_and_reassembles_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "stream": true,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new("sk-test", server.uri());
    let request = ChatStreamRequest::new(
        "gpt-4o-mini",
        vec![ChatMessage::user("s1", "search for x")],
    )
    .with_tools(vec![ToolSchema {
        name: "web_search".into(),
        description: "Search the web".into(),
        parameters: serde_json::json!({"type": "object"}),
    }]);

    let chunks = collect(&client, &request).await;

    let content: String = chunks
        .iter()
        .filter_map(|c| c.delta.content.clone())
        .collect();
    assert_eq!(content, "Hello");

    let mut accumulator = ToolCallAccumulator::new();
    for chunk in &chunks {
        for delta in &chunk.delta.tool_calls {
            accumulator.apply(delta);
        }
    }
    let calls = accumulator.finish();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_1");
    assert_eq!(calls[0].name, "web_search");
    assert_eq!(calls[0].arguments, "{\"q\":\"x\"}");

    // The wire delivers usage in a trailer after finish_reason; the client
    // folds it into the finish chunk so a consumer that stops reading at
    // finish_reason still sees the totals.
    let finish_chunk = chunks
        .iter()
        .find(|c| c.finish_reason.is_some())
        .expect("finish chunk");
    assert_eq!(finish_chunk.finish_reason, Some(FinishReason::ToolCalls));
    let usage = finish_chunk.usage.expect("usage folded into finish chunk");
    assert_eq!(usage.input_tokens, 12);
    assert_eq!(usage.output_tokens, 7);

    // No stray usage-only chunk is emitted past the finish chunk.
    assert!(chunks.last().unwrap().finish_reason.is_some());
}

#[tokio::test]
async fn server_error_maps_to_retryable_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new("sk-test", server.uri());
    let request = ChatStreamRequest::new("gpt-4o-mini", vec![ChatMessage::user("s1", "hi")]);

    let err = client.chat_stream(&request).await.err().unwrap();
    assert!(matches!(err, DroverError::Api { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn auth_error_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new("sk-bad", server.uri());
    let request = ChatStreamRequest::new("gpt-4o-mini", vec![ChatMessage::user("s1", "hi")]);

    let err = client.chat_stream(&request).await.err().unwrap();
    assert!(matches!(err, DroverError::Api { status: 401, .. }));
    assert!(!err.is_retryable());
}
