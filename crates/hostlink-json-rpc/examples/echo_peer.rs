//! Two engines talking over an in-process byte stream
//!
//! The "host" side serves a couple of methods and pushes a status
//! notification; the "client" side calls them individually and as a batch.
//!
//! ```text
//! RUST_LOG=hostlink_json_rpc=debug cargo run --example echo_peer
//! ```

use std::time::Duration;

use hostlink_json_rpc::prelude::*;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (client_stream, host_stream) = tokio::io::duplex(64 * 1024);

    let host = JsonRpcEngine::new();
    host.register_transport(StreamTransport::spawn(host_stream, StreamConfig::default()));
    host.register_fn("echo", |params| async move { Ok(params.into_value()) });
    host.register_fn("add", |params| async move {
        let (a, b): (f64, f64) = params.parse()?;
        Ok::<_, HandlerError>(json!(a + b))
    });

    let client = JsonRpcEngine::with_config(
        EngineConfig::default().with_call_timeout(Duration::from_secs(5)),
    );
    client.register_transport(StreamTransport::spawn(client_stream, StreamConfig::default()));
    client.register_fn("notify_status_update", |params| async move {
        info!(status = %params.into_value(), "status update from host");
        Ok(Value::Null)
    });

    let echoed = client.call("echo", vec![json!("hello"), json!(42)]).await?;
    info!(%echoed, "echo returned");

    let kwargs = json!({"v": 5}).as_object().cloned().unwrap_or_default();
    let echoed = client.call_with_kwargs("echo", kwargs).await?;
    info!(%echoed, "keyword echo returned");

    host.notify("notify_status_update", vec![json!({"toolhead": {"homed": true}})])?;

    let responses = client
        .send_batch(vec![
            BatchItem::request("add").with_args(vec![json!(1), json!(2)]),
            BatchItem::notification("echo"),
            BatchItem::request("add").with_args(vec![json!(0.5), json!(0.25)]),
        ])
        .await?;
    for response in responses {
        info!(index = response.index, method = %response.method, result = %response.result, "batch item settled");
    }

    match client.call("add", vec![json!("one")]).await {
        Err(RpcError::Remote { code, message, .. }) => info!(code, %message, "remote error"),
        other => info!(?other, "unexpected outcome"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
