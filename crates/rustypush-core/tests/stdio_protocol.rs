//! End-to-end tests of the connection loop over an in-memory duplex pipe,
//! exercising the stdio configuration (auto-detected encoding, line-mode
//! fallback).

mod common;

use common::{Behavior, MockChannel, framed, server_with, server_with_channels, tool_report};
use rustypush_core::broadcast::BroadcastConfig;
use rustypush_core::channels::ChannelSet;
use rustypush_core::protocol::NotifyServer;
use rustypush_core::transport::{
    Detection, FrameError, FrameMode, FrameReader, InboundFrame, serve_connection,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Feed `input` to a stdio-style connection, close it, and return every
/// response together with its encoding, plus the loop's exit status.
async fn exchange(
    server: Arc<NotifyServer>,
    input: &[u8],
) -> (Vec<(FrameMode, Value)>, Result<(), FrameError>) {
    let (mut client, server_io) = tokio::io::duplex(1 << 20);
    let task = tokio::spawn(async move {
        let (read_half, write_half) = tokio::io::split(server_io);
        let cancel = CancellationToken::new();
        serve_connection(
            &server,
            BufReader::new(read_half),
            write_half,
            Detection::Auto,
            FrameMode::Line,
            &cancel,
        )
        .await
    });

    client.write_all(input).await.unwrap();
    client.shutdown().await.unwrap();

    let mut raw = Vec::new();
    client.read_to_end(&mut raw).await.unwrap();
    let status = task.await.unwrap();

    let mut frames = FrameReader::new(raw.as_slice(), Detection::Auto);
    let mut responses = Vec::new();
    while let Some(InboundFrame { body, mode }) = frames.next_frame().await.unwrap() {
        responses.push((mode, serde_json::from_slice(&body).unwrap()));
    }
    (responses, status)
}

fn line(value: Value) -> Vec<u8> {
    let mut out = serde_json::to_vec(&value).unwrap();
    out.push(b'\n');
    out
}

mod handshake {
    use super::*;

    #[tokio::test]
    async fn test_initialize_then_list() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = line(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}));
        input.extend(line(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})));
        input.extend(line(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})));

        let (responses, status) = exchange(server, &input).await;
        assert!(status.is_ok());
        assert_eq!(responses.len(), 2);

        let (mode, init) = &responses[0];
        assert_eq!(*mode, FrameMode::Line);
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["protocolVersion"], "2024-11-05");

        let (_, list) = &responses[1];
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["notify_send", "notify_event"]);
    }

    #[tokio::test]
    async fn test_reply_matches_request_encoding() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = framed(r#"{"jsonrpc":"2.0","id":"a","method":"prompts/list"}"#);
        input.extend(line(json!({"id": "b", "method": "prompts/list"})));

        let (responses, _) = exchange(server, &input).await;
        assert_eq!(responses[0].0, FrameMode::Framed);
        assert_eq!(responses[0].1["id"], "a");
        assert_eq!(responses[1].0, FrameMode::Line);
        assert_eq!(responses[1].1["id"], "b");
    }

    #[tokio::test]
    async fn test_legacy_bare_message() {
        let server = server_with_channels(ChannelSet::new());
        let (responses, _) = exchange(server, &line(json!({"method": "tools/list"}))).await;
        let (_, body) = &responses[0];
        assert!(body.get("jsonrpc").is_none());
        assert_eq!(body["tools"].as_array().unwrap().len(), 2);
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_unknown_notification_writes_nothing() {
        let server = server_with_channels(ChannelSet::new());
        let input = line(json!({"jsonrpc": "2.0", "method": "does/not/exist"}));
        let (responses, status) = exchange(server, &input).await;
        assert!(status.is_ok());
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_then_recovery() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = b"{this is not json}\n".to_vec();
        input.extend(line(json!({"jsonrpc": "2.0", "id": 5, "method": "initialize"})));

        let (responses, _) = exchange(server, &input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].1["error"]["code"], -32700);
        assert_eq!(responses[0].1["id"], Value::Null);
        assert_eq!(responses[1].1["id"], 5);
    }

    #[tokio::test]
    async fn test_header_shaped_line_is_a_parse_error() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = b"oops: not json\n".to_vec();
        input.extend(line(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})));
        input.extend(line(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})));

        let (responses, status) = exchange(server, &input).await;
        assert!(status.is_ok());
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].1["error"]["code"], -32700);
        assert_eq!(responses[1].1["id"], 1);
        assert_eq!(responses[2].1["id"], 2);
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected_and_connection_survives() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = vec![b'['; 12 * 1024 * 1024];
        input.push(b'\n');
        input.extend(line(json!({"jsonrpc": "2.0", "id": 4, "method": "initialize"})));

        let (responses, status) = exchange(server, &input).await;
        assert!(status.is_ok());
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].0, FrameMode::Line);
        assert_eq!(responses[0].1["error"]["code"], -32700);
        assert!(
            responses[0].1["error"]["message"]
                .as_str()
                .unwrap()
                .contains("exceeds limit")
        );
        assert_eq!(responses[1].1["id"], 4);
    }

    #[tokio::test]
    async fn test_framed_parse_error_uses_line_fallback() {
        let server = server_with_channels(ChannelSet::new());
        let (responses, _) = exchange(server, &framed("{oops")).await;
        assert_eq!(responses[0].0, FrameMode::Line);
        assert_eq!(responses[0].1["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_oversized_frame_does_not_kill_connection() {
        let server = server_with_channels(ChannelSet::new());
        let mut input = b"Content-Length: 999999999\r\n\r\n".to_vec();
        input.extend(framed(r#"{"jsonrpc":"2.0","id":9,"method":"initialize"}"#));

        let (responses, status) = exchange(server, &input).await;
        assert!(status.is_ok());
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].1["error"]["code"], -32700);
        assert_eq!(responses[1].0, FrameMode::Framed);
        assert_eq!(responses[1].1["id"], 9);
    }

    #[tokio::test]
    async fn test_truncated_body_closes_connection() {
        let server = server_with_channels(ChannelSet::new());
        let (responses, status) = exchange(server, b"Content-Length: 50\r\n\r\n{\"id\":1").await;
        assert!(responses.is_empty());
        assert!(matches!(status, Err(FrameError::Truncated)));
    }

    #[tokio::test]
    async fn test_method_not_found_request() {
        let server = server_with_channels(ChannelSet::new());
        let (responses, _) =
            exchange(server, &line(json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}))).await;
        assert_eq!(responses[0].1["error"]["code"], -32601);
        assert_eq!(responses[0].1["id"], 3);
    }
}

mod tools {
    use super::*;

    fn call(id: u64, name: &str, arguments: Value) -> Vec<u8> {
        line(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments},
        }))
    }

    #[tokio::test]
    async fn test_partial_success_over_the_wire() {
        let chan3 = MockChannel::new("chan3", Behavior::Fail("connection refused"));
        let channels = ChannelSet::new()
            .with(MockChannel::new("chan1", Behavior::Ok))
            .with(MockChannel::new("chan2", Behavior::Ok))
            .with(chan3.clone());
        let server = server_with_channels(channels);

        let (responses, _) =
            exchange(server, &call(1, "notify_send", json!({"title": "Deploy", "content": "v2 live"}))).await;
        let result = &responses[0].1["result"];
        assert_eq!(result["isError"], false);

        let report = tool_report(result);
        assert_eq!(report["status"], "partial_success");
        assert_eq!(report["channels_count"], 3);
        assert_eq!(report["errors"], json!({"chan3": "connection refused"}));
        assert_eq!(chan3.calls(), 1);
    }

    #[tokio::test]
    async fn test_event_without_channels() {
        let server = server_with_channels(ChannelSet::new());
        let args = json!({"run_id": "r1", "event": "end", "message": "done", "data": {"progress": 1}});

        let (responses, _) = exchange(server, &call(2, "notify_event", args)).await;
        let result = &responses[0].1["result"];
        assert_eq!(result["isError"], true);

        let report = tool_report(result);
        assert_eq!(report["status"], "error");
        assert_eq!(report["errors"]["config"], "no notification channels configured");
        assert!(report["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_event_title_reaches_channels() {
        let recorder = MockChannel::new("rec", Behavior::Ok);
        let server = server_with_channels(ChannelSet::new().with(recorder.clone()));
        let args = json!({"run_id": "r1", "event": "end", "message": "done", "data": {"progress": 1}});

        exchange(server, &call(3, "notify_event", args)).await;
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent[0].0, "[END] r1");
        assert_eq!(
            sent[0].1,
            "done\n\n**Additional data:**\n```json\n{\n  \"progress\": 1\n}\n```"
        );
    }

    #[tokio::test]
    async fn test_invalid_event_never_dispatches() {
        let recorder = MockChannel::new("rec", Behavior::Ok);
        let server = server_with_channels(ChannelSet::new().with(recorder.clone()));
        let args = json!({"run_id": "r1", "event": "celebrate", "message": "m"});

        let (responses, _) = exchange(server, &call(4, "notify_event", args)).await;
        let result = &responses[0].1["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "invalid event type: celebrate");
        assert_eq!(recorder.calls(), 0);
    }

    #[tokio::test]
    async fn test_skipped_title() {
        let recorder = MockChannel::new("rec", Behavior::Ok);
        let config = BroadcastConfig::new(ChannelSet::new().with(recorder.clone()))
            .with_skip_titles(vec!["heartbeat".into()]);
        let server = server_with(config);

        let (responses, _) =
            exchange(server, &call(5, "notify_send", json!({"title": "heartbeat", "content": "tick"}))).await;
        let report = tool_report(&responses[0].1["result"]);
        assert_eq!(report["errors"]["skipped"], "title skipped by SKIP_PUSH_TITLE");
        assert_eq!(report["channels_count"], 0);
        assert_eq!(recorder.calls(), 0);
    }

    #[tokio::test]
    async fn test_slow_and_panicking_channels() {
        let channels = ChannelSet::new()
            .with(MockChannel::new("fine", Behavior::Ok))
            .with(MockChannel::new("slow", Behavior::Sleep(Duration::from_secs(10))))
            .with(MockChannel::new("wild", Behavior::Panic));
        let server = server_with(BroadcastConfig::new(channels).with_timeout(Duration::from_millis(100)));

        let (responses, _) =
            exchange(server, &call(6, "notify_send", json!({"title": "t", "content": "c"}))).await;
        let report = tool_report(&responses[0].1["result"]);
        assert_eq!(report["status"], "partial_success");
        assert_eq!(report["errors"]["slow"], "timeout after 100ms");
        assert_eq!(report["errors"]["wild"], "sender panicked");
    }

    #[tokio::test]
    async fn test_direct_worker_method() {
        let recorder = MockChannel::new("rec", Behavior::Ok);
        let server = server_with_channels(ChannelSet::new().with(recorder.clone()));
        let request = line(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "notify.send",
            "params": {"title": "direct", "content": "call"},
        }));

        let (responses, _) = exchange(server, &request).await;
        assert_eq!(responses[0].1["result"]["status"], "success");
        assert_eq!(recorder.calls(), 1);
    }
}
