//! End-to-end engine behavior over an in-memory transport

use std::sync::Arc;
use std::time::Duration;

use hostlink_json_rpc::prelude::*;
use hostlink_json_rpc::{BatchItemError, ChannelTransport};
use serde_json::{Value, json};
use tokio::sync::mpsc;

struct Harness {
    engine: JsonRpcEngine,
    transport: Arc<ChannelTransport>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    fn new() -> Self {
        let engine = JsonRpcEngine::new();
        let (transport, outbound) = ChannelTransport::new();
        engine.register_transport(transport.clone());
        Self {
            engine,
            transport,
            outbound,
        }
    }

    fn sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("transport closed");
        serde_json::from_str(&text).unwrap()
    }
}

fn kwargs(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_echo_request_produces_one_response() {
    let mut h = Harness::new();
    h.engine.register_fn("echo", |params| async move {
        match params {
            Params::Keyword(map) => Ok(Value::Object(map)),
            Params::Positional(mut args) => Ok(args.pop().unwrap_or(Value::Null)),
        }
    });

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"echo","params":{"v":5},"id":"7"}"#)
        .await
        .unwrap();

    assert_eq!(
        h.sent(),
        vec![json!({"jsonrpc": "2.0", "result": {"v": 5}, "id": "7"})]
    );
}

#[tokio::test]
async fn test_failing_method_produces_server_error_frame() {
    let mut h = Harness::new();
    h.engine
        .register_fn("echo", |_| async { Err(HandlerError::failed("boom")) });

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"echo","params":{"v":5},"id":"7"}"#)
        .await
        .unwrap();

    let frames = h.sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], json!("7"));
    assert_eq!(frames[0]["error"]["code"], json!(-31000));
    assert_eq!(frames[0]["error"]["message"], json!("boom"));
}

#[tokio::test]
async fn test_unregistered_method_sends_nothing() {
    let mut h = Harness::new();
    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"nobody.home","params":[],"id":"3"}"#)
        .await
        .unwrap();
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn test_inbound_notification_is_served_without_reply() {
    let mut h = Harness::new();
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    h.engine.register_fn("notify_gcode_response", move |params| {
        let seen_tx = seen_tx.clone();
        async move {
            seen_tx.send(params).ok();
            Ok(Value::Null)
        }
    });

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"notify_gcode_response","params":["ok"]}"#)
        .await
        .unwrap();

    assert_eq!(
        seen.try_recv().unwrap(),
        Params::Positional(vec![json!("ok")])
    );
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn test_scalar_params_get_invalid_params_reply() {
    let mut h = Harness::new();
    h.engine.register_fn("echo", |_| async { Ok(json!("never")) });

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"echo","params":42,"id":"5"}"#)
        .await
        .unwrap();
    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"echo","params":42}"#)
        .await
        .unwrap();

    let frames = h.sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], json!("5"));
    assert_eq!(frames[0]["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_numeric_inbound_id_is_echoed() {
    let mut h = Harness::new();
    h.engine.register_fn("ping", |_| async { Ok(json!("pong")) });

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","method":"ping","id":12}"#)
        .await
        .unwrap();

    assert_eq!(
        h.sent(),
        vec![json!({"jsonrpc": "2.0", "result": "pong", "id": 12})]
    );
}

#[tokio::test]
async fn test_inbound_batch_processes_every_element() {
    let mut h = Harness::new();
    h.engine.register_fn("ping", |_| async { Ok(json!("pong")) });
    let pending = h.engine.call("server.info", vec![]);
    h.sent();

    h.engine
        .process_received(
            r#"[
                {"jsonrpc":"2.0","method":"ping","id":"a"},
                {"jsonrpc":"1.0","method":"ping","id":"b"},
                "garbage",
                {"jsonrpc":"2.0","result":{"state":"ready"},"id":"0"},
                {"jsonrpc":"2.0","method":"ping","id":"c"}
            ]"#,
        )
        .await
        .unwrap();

    let mut ids: Vec<String> = h
        .sent()
        .into_iter()
        .map(|f| f["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(pending.await.unwrap(), json!({"state": "ready"}));
}

#[tokio::test]
async fn test_invalid_frames_are_dropped_silently() {
    let mut h = Harness::new();
    h.engine.register_fn("ping", |_| async { Ok(json!("pong")) });

    for text in [
        r#"{"jsonrpc":"1.0","method":"ping","id":"1"}"#,
        r#"{"method":"ping","id":"1"}"#,
        r#"{"jsonrpc":"2.0","id":"1"}"#,
        r#"{"jsonrpc":"2.0","error":{"code":1,"message":"x"},"id":null}"#,
        r#"17"#,
    ] {
        h.engine.process_received(text).await.unwrap();
    }
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn test_handler_may_call_back_into_engine() {
    let mut h = Harness::new();
    let engine = h.engine.clone();
    h.engine.register_fn("agent.resolve", move |_| {
        let engine = engine.clone();
        async move {
            let found = engine
                .call("host.lookup", vec![])
                .await
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            Ok::<_, HandlerError>(json!({"lookup": found}))
        }
    });

    h.transport
        .inject(r#"{"jsonrpc":"2.0","method":"agent.resolve","id":"h1"}"#);
    let nested = h.next_sent().await;
    assert_eq!(nested["method"], json!("host.lookup"));

    let reply = json!({"jsonrpc": "2.0", "result": "found", "id": nested["id"]});
    h.transport.inject(reply.to_string());

    assert_eq!(
        h.next_sent().await,
        json!({"jsonrpc": "2.0", "result": {"lookup": "found"}, "id": "h1"})
    );
}

#[tokio::test]
async fn test_stuck_handler_does_not_hold_up_responses() {
    let mut h = Harness::new();
    h.engine.register_fn("notify_slow", |_| async {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    });
    let pending = h.engine.call("server.info", vec![]);
    h.sent();

    h.transport
        .inject(r#"{"jsonrpc":"2.0","method":"notify_slow","params":[]}"#);
    h.transport
        .inject(r#"{"jsonrpc":"2.0","result":"ok","id":"0"}"#);

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("response was held behind a running handler")
        .unwrap();
    assert_eq!(result, json!("ok"));
}

#[tokio::test]
async fn test_panicking_handler_gets_error_reply_and_engine_keeps_serving() {
    let mut h = Harness::new();
    h.engine.register_fn("explode", |_| async {
        if true {
            panic!("thermal runaway");
        }
        Ok(Value::Null)
    });
    h.engine.register_fn("ping", |_| async { Ok(json!("pong")) });

    h.transport
        .inject(r#"{"jsonrpc":"2.0","method":"explode","id":"1"}"#);
    let reply = h.next_sent().await;
    assert_eq!(reply["id"], json!("1"));
    assert_eq!(reply["error"]["code"], json!(-31000));
    assert_eq!(reply["error"]["message"], json!("thermal runaway"));

    h.transport
        .inject(r#"{"jsonrpc":"2.0","method":"ping","id":"2"}"#);
    assert_eq!(
        h.next_sent().await,
        json!({"jsonrpc": "2.0", "result": "pong", "id": "2"})
    );
}

#[tokio::test]
async fn test_call_resolves_through_bound_transport() {
    let mut h = Harness::new();
    let pending = h
        .engine
        .call_with_kwargs("printer.objects.query", kwargs(json!({"objects": {"toolhead": null}})));

    let request = h.next_sent().await;
    assert_eq!(request["params"], json!({"objects": {"toolhead": null}}));

    let reply = json!({"jsonrpc": "2.0", "result": {"eventtime": 1.5}, "id": request["id"]});
    assert!(h.transport.inject(reply.to_string()));

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("call did not settle")
        .unwrap();
    assert_eq!(result, json!({"eventtime": 1.5}));
}

#[tokio::test]
async fn test_responses_may_arrive_out_of_order() {
    let mut h = Harness::new();
    let first = h.engine.call("a", vec![]);
    let second = h.engine.call("b", vec![]);
    h.sent();

    h.transport
        .inject(r#"{"jsonrpc":"2.0","result":"second","id":"1"}"#);
    h.transport
        .inject(r#"{"jsonrpc":"2.0","result":"first","id":"0"}"#);

    let (first, second) = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(first, second)
    })
    .await
    .unwrap();
    assert_eq!(first.unwrap(), json!("first"));
    assert_eq!(second.unwrap(), json!("second"));
}

#[tokio::test]
async fn test_batch_assigns_ids_to_requests_only() {
    let mut h = Harness::new();
    let aggregate = h.engine.send_batch(vec![
        BatchItem::request("a"),
        BatchItem::notification("b"),
        BatchItem::request("c"),
    ]);

    let frames = h.sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0],
        json!([
            {"jsonrpc": "2.0", "method": "a", "id": "0"},
            {"jsonrpc": "2.0", "method": "b"},
            {"jsonrpc": "2.0", "method": "c", "id": "1"}
        ])
    );

    h.engine
        .process_received(r#"{"jsonrpc":"2.0","result":"C","id":"1"}"#)
        .await
        .unwrap();
    h.engine
        .process_received(r#"{"jsonrpc":"2.0","result":"A","id":"0"}"#)
        .await
        .unwrap();

    let responses = aggregate.await.unwrap();
    assert_eq!(
        responses,
        vec![
            BatchResponse {
                method: "a".into(),
                index: 0,
                result: json!("A")
            },
            BatchResponse {
                method: "c".into(),
                index: 2,
                result: json!("C")
            },
        ]
    );
}

#[tokio::test]
async fn test_batch_rejects_with_failing_item_position() {
    let mut h = Harness::new();
    let aggregate = h.engine.send_batch(vec![
        BatchItem::request("a"),
        BatchItem::notification("b"),
        BatchItem::request("c").with_args(vec![json!(1)]),
    ]);
    h.sent();

    h.engine
        .process_received(
            r#"[{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":"1"}]"#,
        )
        .await
        .unwrap();

    match aggregate.await {
        Err(RpcError::BatchItem(item)) => {
            let BatchItemError {
                method,
                index,
                error,
            } = *item;
            assert_eq!(method, "c");
            assert_eq!(index, 2);
            assert_eq!(error.code(), Some(-32601));
        }
        other => panic!("expected batch item failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_without_transport_is_rejected() {
    let engine = JsonRpcEngine::new();
    let result = engine
        .send_batch(vec![BatchItem::request("a")])
        .await;
    assert!(matches!(result, Err(RpcError::TransportUnavailable)));
    assert_eq!(engine.pending_calls(), 0);
}

#[tokio::test]
async fn test_notification_only_batch_settles_immediately() {
    let mut h = Harness::new();
    let responses = h
        .engine
        .send_batch(vec![BatchItem::notification("x"), BatchItem::notification("y")])
        .await
        .unwrap();
    assert!(responses.is_empty());
    assert_eq!(h.sent().len(), 1);
    assert_eq!(h.engine.pending_calls(), 0);
}

#[tokio::test]
async fn test_two_engines_talk_to_each_other() {
    let client = JsonRpcEngine::new();
    let host = JsonRpcEngine::new();
    let (client_side, mut client_out) = ChannelTransport::new();
    let (host_side, mut host_out) = ChannelTransport::new();
    client.register_transport(client_side.clone());
    host.register_transport(host_side.clone());

    tokio::spawn(async move {
        while let Some(frame) = client_out.recv().await {
            host_side.inject(frame);
        }
    });
    tokio::spawn(async move {
        while let Some(frame) = host_out.recv().await {
            client_side.inject(frame);
        }
    });

    host.register_fn("add", |params| async move {
        let (a, b): (i64, i64) = params.parse()?;
        Ok::<_, HandlerError>(json!(a + b))
    });

    let sum = tokio::time::timeout(
        Duration::from_secs(1),
        client.call("add", vec![json!(2), json!(3)]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(sum, json!(5));

    let error = tokio::time::timeout(
        Duration::from_secs(1),
        client.call("add", vec![json!("two")]),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert_eq!(error.code(), Some(-31000));
}
