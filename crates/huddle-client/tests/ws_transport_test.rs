//! Integration tests for the WebSocket connector.
//!
//! These tests connect a real `WsConnector` to a tungstenite server on a
//! loopback socket.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use huddle_client::{ClientConfig, Connector, TransportCommand, TransportEvent, WsConnector};
use huddle_core::ConversationId;
use huddle_proto::CloseCode;
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode as WsCloseCode},
    },
};

/// Upgrade request as seen by the server.
#[derive(Debug, Default)]
struct Upgrade {
    path: String,
    api_key: Option<String>,
}

async fn bind() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig::new(&format!("ws://{addr}")).unwrap();
    (listener, config)
}

fn conversation() -> ConversationId {
    ConversationId::new("g1").unwrap()
}

#[tokio::test]
async fn frames_flow_both_ways_and_close_code_is_reported() {
    let (listener, mut config) = bind().await;
    config.api_key = Some("secret".into());

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut upgrade = Upgrade::default();
        let mut ws = accept_hdr_async(tcp, |request: &Request, response: Response| {
            upgrade.path = request.uri().path().to_string();
            upgrade.api_key = request
                .headers()
                .get("x-api-key")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .unwrap();

        let received = ws.next().await.unwrap().unwrap().into_text().unwrap();
        ws.send(Message::text(r#"{"type":"presence","count":2}"#)).await.unwrap();
        ws.close(Some(CloseFrame { code: WsCloseCode::from(4000), reason: "maintenance".into() }))
            .await
            .unwrap();
        while ws.next().await.is_some() {}

        (upgrade, received.to_string())
    });

    let connector = WsConnector::new(Arc::new(config));
    let mut link = connector.connect(&conversation()).await.unwrap();

    link.to_server.send(TransportCommand::Text("hello".into())).await.unwrap();

    let first = timeout(Duration::from_secs(5), link.from_server.recv()).await.unwrap();
    assert_eq!(first, Some(TransportEvent::Text(r#"{"type":"presence","count":2}"#.into())));

    let closed = timeout(Duration::from_secs(5), link.from_server.recv()).await.unwrap();
    assert_eq!(
        closed,
        Some(TransportEvent::Closed { code: CloseCode::new(4000), reason: Some("maintenance".into()) })
    );

    drop(link);
    let (upgrade, received) = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert_eq!(upgrade.path, "/chat/ws/g1");
    assert_eq!(upgrade.api_key.as_deref(), Some("secret"));
    assert_eq!(received, "hello");
}

#[tokio::test]
async fn close_command_sends_close_frame() {
    let (listener, config) = bind().await;

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => break frame.map(|f| (u16::from(f.code), f.reason.to_string())),
                Some(Ok(_)) => {},
                Some(Err(_)) | None => break None,
            }
        }
    });

    let connector = WsConnector::new(Arc::new(config));
    let link = connector.connect(&conversation()).await.unwrap();
    link.to_server
        .send(TransportCommand::Close { code: CloseCode::NORMAL, reason: "teardown".into() })
        .await
        .unwrap();

    let frame = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert_eq!(frame, Some((1000, "teardown".to_string())));
}

#[tokio::test]
async fn connect_fails_without_a_server() {
    let (listener, config) = bind().await;
    drop(listener);

    let connector = WsConnector::new(Arc::new(config));
    let result = connector.connect(&conversation()).await;

    assert!(result.is_err(), "connecting to a closed port should fail");
}
