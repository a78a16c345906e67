//! Integration tests for the invocation loop against a mock host.

mod support;

use bytes::Bytes;
use futures::stream;
use lambda_rt::error::{
    INPUT_ERROR, INVALID_COGNITO_IDENTITY, INVALID_CONTENT_TYPE, INVALID_DEADLINE,
};
use lambda_rt::http::{ERROR_BODY_TRAILER, ERROR_TYPE_TRAILER, STREAMING_CONTENT_TYPE};
use lambda_rt::prelude::*;
use lambda_rt::RuntimeApiClient;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use support::{MockHost, PostKind, QueuedInvoke, FUNCTION_ARN, TRACE_ID};
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct CustomError;

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Something went wrong")
    }
}

#[derive(Deserialize)]
struct CustomIn {
    custom: i64,
}

#[derive(Serialize)]
struct NumberOut {
    #[serde(rename = "Number")]
    number: i64,
}

fn split_prelude(raw: &[u8]) -> (serde_json::Value, &[u8]) {
    let end = raw
        .windows(8)
        .position(|w| w == [0u8; 8])
        .expect("prelude delimiter");
    (serde_json::from_slice(&raw[..end]).unwrap(), &raw[end + 8..])
}

#[tokio::test]
async fn test_echo_string() {
    let host = MockHost::start().await;
    host.enqueue("req-echo", r#""hello""#);

    let handler = handler_fn(|_ctx, s: String| async move { Ok::<_, Infallible>(s) });
    let err = host.serve(handler, HandlerOptions::new(), 1).await;
    assert!(matches!(err, RuntimeError::UnexpectedStatus { status: 500, .. }));

    let post = host.post_for("req-echo");
    assert_eq!(post.kind, PostKind::Response);
    assert_eq!(post.text(), r#""hello""#);
    assert_eq!(post.header("content-type"), Some("application/json"));
    assert!(post.header("user-agent").is_some_and(|ua| ua.starts_with("lambda-rt/")));
}

#[tokio::test]
async fn test_structured_input_output() {
    let host = MockHost::start().await;
    host.enqueue("req-struct", r#"{"custom":9001}"#);

    let handler = input_fn(|input: CustomIn| async move {
        Ok::<_, Infallible>(NumberOut { number: input.custom })
    });
    host.serve(handler, HandlerOptions::new(), 1).await;

    assert_eq!(host.post_for("req-struct").text(), r#"{"Number":9001}"#);
}

#[tokio::test]
async fn test_user_error_reported_and_loop_continues() {
    let host = MockHost::start().await;
    host.enqueue("req-fail", "null");
    host.enqueue("req-after", "null");

    let handler = unit_fn(|| async { Err::<(), _>(CustomError) });
    host.serve(handler, HandlerOptions::new(), 1).await;

    let post = host.post_for("req-fail");
    assert_eq!(post.kind, PostKind::Error);
    assert_eq!(
        post.json(),
        serde_json::json!({"errorMessage": "Something went wrong", "errorType": "CustomError"})
    );
    assert_eq!(post.header("Lambda-Runtime-Function-Error-Type"), Some("CustomError"));
    assert_eq!(host.post_for("req-after").kind, PostKind::Error);
}

#[tokio::test]
async fn test_invalid_content_type_reported_and_loop_continues() {
    let host = MockHost::start().await;
    host.enqueue("req-ct", r#""text/plain\n""#);
    host.enqueue("req-ok", r#""text/plain""#);

    let handler = input_fn(|content_type: String| async move {
        Ok::<_, Infallible>(Response::bytes("x").content_type(content_type))
    });
    let err = host.serve(handler, HandlerOptions::new(), 1).await;
    assert!(matches!(err, RuntimeError::UnexpectedStatus { status: 500, .. }));

    let post = host.post_for("req-ct");
    assert_eq!(post.kind, PostKind::Error);
    assert_eq!(post.json()["errorType"], INVALID_CONTENT_TYPE);

    let post = host.post_for("req-ok");
    assert_eq!(post.kind, PostKind::Response);
    assert_eq!(post.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_unknown_fields_rejected_when_configured() {
    let host = MockHost::start().await;
    host.enqueue("req-extra", r#"{"custom":1,"extra":2}"#);
    host.enqueue("req-exact", r#"{"custom":2}"#);

    let handler = input_fn(|input: CustomIn| async move {
        Ok::<_, Infallible>(NumberOut { number: input.custom })
    });
    host.serve(handler, HandlerOptions::new().disallow_unknown_fields(true), 1).await;

    let post = host.post_for("req-extra");
    assert_eq!(post.kind, PostKind::Error);
    assert_eq!(post.json()["errorType"], INPUT_ERROR);
    assert_eq!(host.post_for("req-exact").text(), r#"{"Number":2}"#);
}

#[tokio::test]
async fn test_panic_is_reported_then_fatal() {
    let host = MockHost::start().await;
    host.enqueue("req-panic", "null");
    host.enqueue("req-never", "null");

    let handler = unit_fn(|| async {
        if true {
            panic!("Panic time!");
        }
        Ok::<(), Infallible>(())
    });
    let err = host.serve(handler, HandlerOptions::new(), 1).await;
    assert!(matches!(err, RuntimeError::HandlerPanicked(ref message) if message == "Panic time!"));

    let posts = host.posts();
    assert_eq!(posts.len(), 1);
    let doc = posts[0].json();
    assert_eq!(doc["errorMessage"], "Panic time!");
    assert!(!doc["errorType"].as_str().unwrap_or_default().is_empty());
    let frames = doc["stackTrace"].as_array().expect("stack trace");
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f.get("path").is_some() && f.get("label").is_some()));
}

#[tokio::test]
async fn test_streaming_response() {
    let host = MockHost::start().await;
    host.enqueue("req-stream", "null");

    let handler = unit_fn(|| async {
        let chunks = vec![
            Ok::<_, Infallible>(Bytes::from_static(b"<html>")),
            Ok(Bytes::from_static(b"yolo</html>")),
        ];
        Ok::<_, Infallible>(
            StreamingResponse::new(stream::iter(chunks))
                .status(418)
                .header("hello", "world")
                .header("Set-Cookie", "yummy=cookie"),
        )
    });
    host.serve(handler, HandlerOptions::new(), 1).await;

    let post = host.post_for("req-stream");
    assert_eq!(post.kind, PostKind::Response);
    assert_eq!(post.header("content-type"), Some(STREAMING_CONTENT_TYPE));
    assert!(post.trailers.is_none());

    let (prelude, body) = split_prelude(&post.body);
    assert_eq!(
        prelude,
        serde_json::json!({
            "statusCode": 418,
            "headers": {"hello": "world"},
            "cookies": ["yummy=cookie"]
        })
    );
    assert_eq!(body, b"<html>yolo</html>");
}

#[tokio::test]
async fn test_response_writer_streams_from_task() {
    let host = MockHost::start().await;
    host.enqueue("req-writer", "null");

    let handler = unit_fn(|| async {
        let (mut writer, response) = ResponseWriter::channel();
        tokio::spawn(async move {
            writer.set_header("content-type", "text/plain");
            writer.write_header(202);
            writer.write_header(500);
            for part in ["a", "b", "c"] {
                if writer.write(part).await.is_err() {
                    return;
                }
            }
        });
        Ok::<_, Infallible>(response)
    });
    host.serve(handler, HandlerOptions::new(), 1).await;

    let post = host.post_for("req-writer");
    let (prelude, body) = split_prelude(&post.body);
    assert_eq!(prelude["statusCode"], 202);
    assert_eq!(prelude["headers"]["content-type"], "text/plain");
    assert_eq!(body, b"abc");
}

#[tokio::test]
async fn test_mid_stream_error_sends_trailers() {
    let host = MockHost::start().await;
    host.enqueue("req-broken", "null");

    let handler = unit_fn(|| async {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(InvocationError::new("UpstreamError", "connection reset")),
        ];
        Ok::<_, Infallible>(Response::stream(stream::iter(chunks)).content_type("text/plain"))
    });
    host.serve(handler, HandlerOptions::new(), 1).await;

    let post = host.post_for("req-broken");
    assert_eq!(post.kind, PostKind::Response);
    assert_eq!(post.text(), "partial");
    assert!(post
        .header("trailer")
        .is_some_and(|t| t.contains(&ERROR_TYPE_TRAILER.to_ascii_lowercase())));

    let trailers = post.trailers.expect("error trailers");
    assert_eq!(trailers[ERROR_TYPE_TRAILER], "UpstreamError");
    assert!(trailers.contains_key(ERROR_BODY_TRAILER));
}

#[tokio::test]
async fn test_invalid_deadline_reported_and_loop_continues() {
    let host = MockHost::start().await;
    host.push(QueuedInvoke::new("req-no-deadline", "null").raw_deadline(None));
    host.push(QueuedInvoke::new("req-bad-deadline", "null").raw_deadline(Some("tomorrow")));
    host.push(
        QueuedInvoke::new("req-bad-identity", "null")
            .header("Lambda-Runtime-Cognito-Identity", "{"),
    );
    host.enqueue("req-ok", r#""fine""#);

    let handler = input_fn(|s: String| async move { Ok::<_, Infallible>(s) });
    host.serve(handler, HandlerOptions::new(), 1).await;

    assert_eq!(host.post_for("req-no-deadline").json()["errorType"], INVALID_DEADLINE);
    assert_eq!(host.post_for("req-bad-deadline").json()["errorType"], INVALID_DEADLINE);
    assert_eq!(host.post_for("req-bad-identity").json()["errorType"], INVALID_COGNITO_IDENTITY);
    assert_eq!(host.post_for("req-ok").text(), r#""fine""#);
}

#[tokio::test]
async fn test_non_200_next_is_fatal() {
    let host = MockHost::start().await;
    host.set_exhausted_status(hyper::StatusCode::GONE);

    let handler = unit_fn(|| async {});
    let err = host.serve(handler, HandlerOptions::new(), 1).await;
    assert!(matches!(err, RuntimeError::UnexpectedStatus { status: 410, .. }));
    assert!(err.to_string().contains("410"));
    assert!(host.posts().is_empty());
}

#[tokio::test]
async fn test_context_carries_invoke_metadata() {
    let host = MockHost::start().await;
    host.push(
        QueuedInvoke::new("req-ctx", "null")
            .header("Lambda-Runtime-Client-Context", r#"{"custom":{"tier":"gold"}}"#),
    );

    #[derive(Debug, Clone, PartialEq)]
    struct Tenant(&'static str);

    let handler = context_fn(|ctx: Context| async move {
        let lc = ctx.lambda_context().expect("lambda context").clone();
        Ok::<_, Infallible>(serde_json::json!({
            "request_id": lc.aws_request_id,
            "arn": lc.invoked_function_arn,
            "trace_id": ctx.trace_id(),
            "tier": lc.client_context.custom.get("tier"),
            "tenant": ctx.value::<Tenant>().map(|t| t.0),
            "has_deadline": ctx.deadline().is_some(),
            "live": ctx.err().is_none(),
        }))
    });
    let options =
        HandlerOptions::new().base_context(Context::background().with_value(Tenant("acme")));
    host.serve(handler, options, 1).await;

    assert_eq!(
        host.post_for("req-ctx").json(),
        serde_json::json!({
            "request_id": "req-ctx",
            "arn": FUNCTION_ARN,
            "trace_id": TRACE_ID,
            "tier": "gold",
            "tenant": "acme",
            "has_deadline": true,
            "live": true,
        })
    );
}

#[tokio::test]
async fn test_context_done_at_invoke_deadline() {
    let host = MockHost::start().await;
    host.push(QueuedInvoke::new("req-timeout", "null").deadline_in(Duration::from_millis(150)));

    let handler = context_fn(|ctx: Context| async move {
        let started = Instant::now();
        let reason = ctx.done().await;
        Ok::<_, Infallible>(serde_json::json!({
            "reason": reason.to_string(),
            "waited_ms": started.elapsed().as_millis() as u64,
        }))
    });
    host.serve(handler, HandlerOptions::new(), 1).await;

    let doc = host.post_for("req-timeout").json();
    assert_eq!(doc["reason"], "context deadline exceeded");
    assert!(doc["waited_ms"].as_u64().unwrap() < 5_000);
}

#[tokio::test]
async fn test_codec_options_apply() {
    let host = MockHost::start().await;
    host.enqueue("req-pretty", "null");

    let handler = unit_fn(|| async { Ok::<_, Infallible>(serde_json::json!({"html": "<b>"})) });
    let options = HandlerOptions::new().escape_html(false).indent("", "  ");
    host.serve(handler, options, 1).await;

    assert_eq!(host.post_for("req-pretty").text(), "{\n  \"html\": \"<b>\"\n}\n");
}

struct RawHandler;

#[async_trait]
impl Handler for RawHandler {
    async fn invoke(&self, ctx: Context, payload: Bytes) -> Result<Response, InvocationError> {
        let mut out = ctx.request_id().unwrap_or_default().as_bytes().to_vec();
        out.push(b':');
        out.extend_from_slice(&payload);
        Ok(Response::bytes(out))
    }
}

#[tokio::test]
async fn test_raw_handler_gets_bytes() {
    let host = MockHost::start().await;
    host.enqueue("req-raw", "not json at all");

    host.serve(RawHandler, HandlerOptions::new(), 1).await;

    let post = host.post_for("req-raw");
    assert_eq!(post.text(), "req-raw:not json at all");
    assert_eq!(post.header("content-type"), Some("application/octet-stream"));
}

#[tokio::test]
async fn test_init_error_and_status_checks() {
    let host = MockHost::start().await;
    let client = host.client();

    assert_ok!(client.init_error(&InvocationError::new("Runtime.InvalidConfig", "bad")).await);
    let posts = host.posts();
    assert_eq!(posts[0].kind, PostKind::InitError);
    assert_eq!(posts[0].json()["errorType"], "Runtime.InvalidConfig");

    // An unknown endpoint answers 404 instead of 202.
    let stray = RuntimeApiClient::new(format!("{}/nowhere", host.addr()));
    assert_err!(stray.failure("req-x", &InvocationError::new("X", "y")).await);
}
