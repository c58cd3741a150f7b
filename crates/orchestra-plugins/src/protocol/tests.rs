//! Unit tests for the JSON-RPC protocol types.

use rstest::rstest;
use serde_json::json;

use super::*;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_line_matches_wire_format() {
    let request = RpcRequest::new(1_u64, "ping", json!({}));
    let line = request.to_line().expect("serialise");
    assert_eq!(
        line,
        "{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"params\":{},\"id\":1}\n"
    );
}

#[test]
fn request_line_is_single_line_even_with_multiline_strings() {
    let request = RpcRequest::new(7_u64, "render", json!({"body": "line one\nline two"}));
    let line = request.to_line().expect("serialise");
    assert_eq!(line.matches('\n').count(), 1);
    assert!(line.ends_with('\n'));
}

#[test]
fn request_accessors() {
    let request = RpcRequest::new(RequestId::String("abc".into()), "chat", json!(null));
    assert_eq!(request.method(), "chat");
    assert_eq!(request.id(), &RequestId::String("abc".into()));
}

#[rstest]
#[case::number(RequestId::Number(42), "42")]
#[case::string(RequestId::String("a1".into()), "\"a1\"")]
fn request_id_display(#[case] id: RequestId, #[case] expected: &str) {
    assert_eq!(id.to_string(), expected);
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn parses_success_response() {
    let message = RpcMessage::parse(r#"{"jsonrpc":"2.0","result":"pong","id":1}"#).expect("parse");
    assert_eq!(
        message,
        RpcMessage::Response(RpcResponse {
            id: RequestId::Number(1),
            payload: ResponsePayload::Result(json!("pong")),
        })
    );
}

#[test]
fn null_result_is_a_valid_success() {
    let message = RpcMessage::parse(r#"{"jsonrpc":"2.0","result":null,"id":3}"#).expect("parse");
    let RpcMessage::Response(response) = message else {
        panic!("expected response");
    };
    assert_eq!(response.payload, ResponsePayload::Result(Value::Null));
}

#[test]
fn parses_error_response() {
    let line = r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error","data":{"hint":"x"}},"id":"req-9"}"#;
    let RpcMessage::Response(response) = RpcMessage::parse(line).expect("parse") else {
        panic!("expected response");
    };
    assert_eq!(response.id, RequestId::String("req-9".into()));
    let ResponsePayload::Error(error) = response.payload else {
        panic!("expected error payload");
    };
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.message, "Internal error");
    assert!(error.data.is_some());
}

#[test]
fn parses_plugin_initiated_request() {
    let message = RpcMessage::parse(r#"{"jsonrpc":"2.0","method":"log","params":{}}"#)
        .expect("parse");
    assert_eq!(
        message,
        RpcMessage::Request {
            method: "log".into(),
            id: None,
        }
    );
}

#[rstest]
#[case::not_json("pong", "invalid JSON")]
#[case::truncated(r#"{"jsonrpc":"2.0","result":"#, "invalid JSON")]
#[case::array("[1,2,3]", "not a JSON object")]
#[case::no_id(r#"{"jsonrpc":"2.0","result":"pong"}"#, "no id")]
#[case::null_id(
    r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"},"id":null}"#,
    "no id"
)]
#[case::negative_id(r#"{"jsonrpc":"2.0","result":1,"id":-4}"#, "not a usable")]
#[case::object_id(r#"{"jsonrpc":"2.0","result":1,"id":{"n":1}}"#, "not a usable")]
#[case::no_outcome(r#"{"jsonrpc":"2.0","id":1}"#, "neither result nor error")]
#[case::both_outcomes(
    r#"{"jsonrpc":"2.0","result":1,"error":{"code":1,"message":"m"},"id":1}"#,
    "both result and error"
)]
#[case::bad_error(r#"{"jsonrpc":"2.0","error":"oops","id":1}"#, "malformed error")]
fn rejects_unusable_lines(#[case] line: &str, #[case] expected: &str) {
    let violation = RpcMessage::parse(line).expect_err("should reject");
    assert!(
        violation.to_string().contains(expected),
        "expected '{expected}' in: {violation}"
    );
}

#[test]
fn error_codes_match_json_rpc() {
    assert_eq!(PARSE_ERROR, -32700);
    assert_eq!(INVALID_REQUEST, -32600);
    assert_eq!(METHOD_NOT_FOUND, -32601);
    assert_eq!(INVALID_PARAMS, -32602);
    assert_eq!(INTERNAL_ERROR, -32603);
}
