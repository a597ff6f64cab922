//! Integration tests for the parent pipe.
//!
//! These drive a full `PipeServer` over in-memory streams and check the
//! exact lines a parent would read back.

use parent_pipe::pipe::{
    Context, HandlerError, HandlerResult, JsonLineTransport, Params, PipeServer, Registry,
    ServerState,
};
use parent_pipe::test_server::{self, TestState, TESTERR_MESSAGE};
use serde_json::{json, Value};

/// Runs the test server over `input` and returns every line it wrote.
async fn serve(input: &str) -> (Vec<Value>, TestState) {
    let transport = JsonLineTransport::new(input.as_bytes(), Vec::new());
    let mut server = PipeServer::new(test_server::registry(), TestState::default(), transport);
    server.run().await.expect("server loop failed");
    assert_eq!(server.status(), ServerState::Stopped);

    let (state, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    (parse_lines(&written), state)
}

fn parse_lines(written: &[u8]) -> Vec<Value> {
    let text = std::str::from_utf8(written).expect("output is not UTF-8");
    assert!(text.is_empty() || text.ends_with('\n'), "unterminated line");
    text.lines()
        .map(|line| serde_json::from_str(line).expect("output line is not JSON"))
        .collect()
}

fn lines(messages: &[Value]) -> String {
    messages.iter().map(|m| format!("{m}\n")).collect()
}

// =============================================================================
// Current dialect
// =============================================================================

#[tokio::test]
async fn test_call_returns_incremented_value() {
    let (replies, _) = serve("{\"method\":\"test1\",\"params\":[5],\"id\":1}\n").await;
    assert_eq!(replies, vec![json!({"id": 1, "result": 6, "error": null})]);
}

#[tokio::test]
async fn test_call_reply_is_byte_exact() {
    let transport = JsonLineTransport::new(
        &b"{\"method\":\"test1\",\"params\":[5],\"id\":1}\n"[..],
        Vec::new(),
    );
    let mut server = PipeServer::new(test_server::registry(), TestState::default(), transport);
    server.run().await.unwrap();
    let (_, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    assert_eq!(written, b"{\"id\":1,\"result\":6,\"error\":null}\n");
}

#[tokio::test]
async fn test_call_echoes_nested_arguments() {
    let (replies, _) =
        serve("{\"method\":\"test2\",\"params\":[\"abc\",\"def\",{\"ghi\":\"jkl\"}],\"id\":2}\n")
            .await;
    assert_eq!(
        replies,
        vec![json!({
            "id": 2,
            "result": [["abc", "def", {"ghi": "jkl"}], "foo"],
            "error": null
        })]
    );
}

#[tokio::test]
async fn test_failing_call_reports_error_and_server_continues() {
    let (replies, _) = serve(concat!(
        "{\"method\":\"testerr\",\"params\":[],\"id\":3}\n",
        "{\"method\":\"test1\",\"params\":[41],\"id\":4}\n",
    ))
    .await;

    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], json!(3));
    assert!(replies[0]["result"].is_null());
    let error = replies[0]["error"].as_str().expect("error should be a string");
    assert!(error.contains(TESTERR_MESSAGE));

    assert_eq!(replies[1], json!({"id": 4, "result": 42, "error": null}));
}

#[tokio::test]
async fn test_unknown_method_is_an_error_reply() {
    let (replies, _) = serve("{\"method\":\"nope\",\"params\":[],\"id\":\"n\"}\n").await;
    assert_eq!(
        replies,
        vec![json!({"id": "n", "result": null, "error": "unknown handler: rpc_nope"})]
    );
}

#[tokio::test]
async fn test_wrong_arity_is_an_error_reply() {
    let (replies, _) = serve("{\"method\":\"test1\",\"params\":[1,2],\"id\":7}\n").await;
    assert_eq!(replies[0]["id"], json!(7));
    assert!(replies[0]["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid params"));
}

#[tokio::test]
async fn test_handshake() {
    let (replies, _) = serve("{\"method\":\"handshake\",\"params\":[],\"id\":0}\n").await;
    assert_eq!(
        replies,
        vec![json!({"id": 0, "result": "handshake", "error": null})]
    );
}

// =============================================================================
// Legacy dialect
// =============================================================================

#[tokio::test]
async fn test_legacy_call() {
    let (replies, _) = serve("{\"rpcReq\":\"test1\",\"rpcArgs\":[5],\"rpcId\":\"x\"}\n").await;
    assert_eq!(replies, vec![json!({"rpcId": "x", "rpcRet": 6})]);
}

#[tokio::test]
async fn test_legacy_failure_wraps_diagnostic() {
    let (replies, _) = serve("{\"rpcReq\":\"testerr\",\"rpcArgs\":[],\"rpcId\":9}\n").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["rpcId"], json!(9));
    let ret = replies[0]["rpcRet"].as_array().expect("rpcRet should be an array");
    assert_eq!(ret.len(), 1);
    assert!(ret[0].as_str().unwrap().contains(TESTERR_MESSAGE));
}

#[tokio::test]
async fn test_dialects_interleave() {
    let (replies, _) = serve(concat!(
        "{\"rpcReq\":\"handshake\",\"rpcArgs\":[],\"rpcId\":1}\n",
        "{\"method\":\"handshake\",\"params\":[],\"id\":1}\n",
    ))
    .await;
    assert_eq!(
        replies,
        vec![
            json!({"rpcId": 1, "rpcRet": "handshake"}),
            json!({"id": 1, "result": "handshake", "error": null}),
        ]
    );
}

// =============================================================================
// Correlation ids and argument fidelity
// =============================================================================

#[tokio::test]
async fn test_ids_keep_their_type() {
    let ids = [json!(1), json!("1"), json!(1.5), json!(-7), json!({"k": [1]}), json!(null)];
    let input = lines(
        &ids.iter()
            .map(|id| json!({"method": "handshake", "id": id}))
            .collect::<Vec<_>>(),
    );

    let (replies, _) = serve(&input).await;
    let echoed: Vec<Value> = replies.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(echoed, ids);
    assert!(echoed[0].is_u64());
    assert!(echoed[1].is_string());
}

#[tokio::test]
async fn test_arguments_round_trip() {
    let value = json!({
        "path": "/usr/local/bin",
        "url": "https://example.com/a/b",
        "n": [1, -2, 3.25, null],
        "nested": {"deep": {"deeper": [true, false]}},
        "text": "tab\tquote\"slash\\"
    });
    let input = lines(&[
        json!({"cmdReq": "set", "cmdArgs": ["blob", value]}),
        json!({"method": "get", "params": ["blob"], "id": 1}),
    ]);

    let (replies, state) = serve(&input).await;
    assert_eq!(state.value("blob"), Some(&value));
    assert_eq!(replies, vec![json!({"id": 1, "result": value, "error": null})]);
}

#[tokio::test]
async fn test_slashes_are_not_escaped_on_the_wire() {
    let transport = JsonLineTransport::new(
        &b"{\"cmdReq\":\"set\",\"cmdArgs\":[\"p\",\"a/b\"]}\n{\"method\":\"get\",\"params\":[\"p\"],\"id\":1}\n"[..],
        Vec::new(),
    );
    let mut server = PipeServer::new(test_server::registry(), TestState::default(), transport);
    server.run().await.unwrap();
    let (_, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    let text = String::from_utf8(written).unwrap();
    assert!(text.contains("\"a/b\""));
    assert!(!text.contains("\\/"));
}

// =============================================================================
// Commands and stream lifecycle
// =============================================================================

#[tokio::test]
async fn test_commands_produce_no_output() {
    let (replies, state) = serve(concat!(
        "{\"cmdReq\":\"set\",\"cmdArgs\":[\"a\",1]}\n",
        "{\"cmdReq\":\"note\",\"cmdArgs\":[\"hello\"]}\n",
        "{\"cmdReq\":\"set\",\"cmdArgs\":[\"b\"]}\n",
    ))
    .await;
    assert!(replies.is_empty());
    assert_eq!(state.value("a"), Some(&json!(1)));
    assert_eq!(state.value("b"), None);
}

#[tokio::test]
async fn test_empty_input_exits_cleanly() {
    let (replies, _) = serve("").await;
    assert!(replies.is_empty());
}

#[tokio::test]
async fn test_eof_terminates_once() {
    let transport = JsonLineTransport::new(
        &b"{\"method\":\"handshake\",\"id\":1}\n"[..],
        Vec::new(),
    );
    let mut server = PipeServer::new(test_server::registry(), TestState::default(), transport);
    server.run().await.unwrap();
    assert_eq!(server.status(), ServerState::Stopped);

    server.run().await.unwrap();
    server.run().await.unwrap();

    let (_, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    assert_eq!(parse_lines(&written).len(), 1);
}

#[tokio::test]
async fn test_emit_precedes_reply() {
    let (replies, _) = serve("{\"method\":\"ping_parent\",\"params\":[\"ready\"],\"id\":5}\n").await;
    assert_eq!(
        replies,
        vec![
            json!({"cmd": "emit", "params": ["ready"]}),
            json!({"id": 5, "result": true, "error": null}),
        ]
    );
}

#[tokio::test]
async fn test_ambiguous_message_is_rejected() {
    let (replies, state) = serve(
        "{\"cmdReq\":\"set\",\"cmdArgs\":[\"k\",1],\"method\":\"get\",\"params\":[\"k\"],\"id\":8}\n",
    )
    .await;
    assert_eq!(state.value("k"), None);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["id"], json!(8));
    assert!(replies[0]["result"].is_null());
    assert!(replies[0]["error"]
        .as_str()
        .unwrap()
        .contains("more than one"));
}

#[tokio::test]
async fn test_malformed_line_ends_the_loop() {
    let transport = JsonLineTransport::new(
        &b"{\"method\":\"handshake\",\"id\":1}\n{\"method\":\n{\"method\":\"handshake\",\"id\":2}\n"[..],
        Vec::new(),
    );
    let mut server = PipeServer::new(test_server::registry(), TestState::default(), transport);
    assert!(server.run().await.is_err());
    assert_eq!(server.status(), ServerState::Stopped);

    let (_, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    let replies = parse_lines(&written);
    assert_eq!(replies, vec![json!({"id": 1, "result": "handshake", "error": null})]);
}

// =============================================================================
// Custom registries
// =============================================================================

#[derive(Default)]
struct Tally {
    total: i64,
}

fn add(ctx: &mut Context<'_, Tally>, params: Params) -> HandlerResult {
    let n: i64 = params.get(0)?;
    ctx.state_mut().total += n;
    Ok(Value::Null)
}

fn tally_registry() -> Registry<Tally> {
    Registry::builder()
        .command("add", add)
        .command("foo", |_ctx, _params| Err(HandlerError::failed("cmd_foo raises")))
        .command("crash", |_ctx, _params| panic!("command blew up"))
        .method("total", |ctx: &mut Context<'_, Tally>, _params| {
            Ok(json!(ctx.state().total))
        })
        .method("explode", |_ctx, params: Params| {
            let values: Vec<i64> = params.get(0)?;
            assert!(values.len() < 3, "too many values");
            Ok(json!(values))
        })
        .build()
}

async fn serve_tally(input: &str) -> (Vec<Value>, Tally) {
    let transport = JsonLineTransport::new(input.as_bytes(), Vec::new());
    let mut server = PipeServer::new(tally_registry(), Tally::default(), transport);
    server.run().await.expect("server loop failed");
    let (state, transport) = server.into_parts();
    let (_, written) = transport.into_inner();
    (parse_lines(&written), state)
}

#[tokio::test]
async fn test_failing_command_is_swallowed() {
    let (replies, state) = serve_tally(concat!(
        "{\"cmdReq\":\"foo\",\"cmdArgs\":[1,2]}\n",
        "{\"cmdReq\":\"add\",\"cmdArgs\":[3]}\n",
        "{\"method\":\"total\",\"params\":[],\"id\":1}\n",
    ))
    .await;
    assert_eq!(state.total, 3);
    assert_eq!(replies, vec![json!({"id": 1, "result": 3, "error": null})]);
}

#[tokio::test]
async fn test_panicking_command_is_swallowed() {
    let (replies, _) = serve_tally(concat!(
        "{\"cmdReq\":\"crash\"}\n",
        "{\"cmdReq\":\"missing\"}\n",
        "{\"method\":\"total\",\"id\":\"t\"}\n",
    ))
    .await;
    assert_eq!(replies, vec![json!({"id": "t", "result": 0, "error": null})]);
}

#[tokio::test]
async fn test_panicking_call_becomes_error_reply() {
    let (replies, _) = serve_tally(concat!(
        "{\"method\":\"explode\",\"params\":[[1,2,3]],\"id\":1}\n",
        "{\"method\":\"explode\",\"params\":[[1]],\"id\":2}\n",
    ))
    .await;
    assert_eq!(
        replies,
        vec![
            json!({"id": 1, "result": null, "error": "handler panicked: too many values"}),
            json!({"id": 2, "result": [1], "error": null}),
        ]
    );
}

#[tokio::test]
async fn test_custom_registry_keeps_handshake() {
    let (replies, _) = serve_tally("{\"rpcReq\":\"handshake\",\"rpcId\":\"h\"}\n").await;
    assert_eq!(replies, vec![json!({"rpcId": "h", "rpcRet": "handshake"})]);
}
