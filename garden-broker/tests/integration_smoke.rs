//! End-to-end WebSocket smoke test: connect, send HELLO_USER, expect
//! HELLO_USER_SUCCESS.
//!
//! Requires a live Postgres reachable at `$GARDEN_TEST_DATABASE_URL`
//! (falls back to `postgres://postgres@localhost/garden_test`), so it is
//! `#[ignore]`d by default the same way the teacher's database-adapter
//! tests are.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use garden_broker::{build_router, Broker};
use garden_core::config::GardenConfig;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_test_server(dsn: String) -> SocketAddr {
    let mut config = GardenConfig::default();
    config.storage.postgres_dsn = Some(dsn);

    let broker = Arc::new(Broker::new(Arc::new(config)));
    broker.db.ensure_schema().await.expect("schema setup");

    let app = build_router(broker);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn hello_user_succeeds() {
    let dsn = std::env::var("GARDEN_TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/garden_test".to_string());
    let addr = spawn_test_server(dsn).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/client"))
        .await
        .expect("websocket connect");

    socket
        .send(Message::Text(
            serde_json::json!({ "type": "HELLO_USER", "data": { "email": "smoke@test.garden" } })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let reply = socket.next().await.unwrap().unwrap();
    let reply: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["type"], "HELLO_USER_SUCCESS");
    assert_eq!(reply["data"]["user"]["email"], "smoke@test.garden");
}
