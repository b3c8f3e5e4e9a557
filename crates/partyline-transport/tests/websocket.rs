//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use partyline_transport::{Connection, Frame, Transport, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    /// Binds on port 0 and returns the transport plus its address.
    async fn bind_any() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);

        // UTF-8 payloads are delivered as text frames.
        server_conn
            .send(br#"{"type":"event"}"#)
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON should travel as a text frame");
        assert_eq!(msg.into_data().as_ref(), br#"{"type":"event"}"#);

        client_ws
            .send(Message::text("hello from client".to_owned()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, Frame::Data(b"hello from client".to_vec()));

        client_ws
            .send(Message::binary(b"raw bytes".to_vec()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, Frame::Data(b"raw bytes".to_vec()));

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_while_reader_is_waiting() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = Arc::new(server_handle.await.unwrap());

        // A reader parked in recv() must not block writes from another task.
        let reader = {
            let conn = Arc::clone(&server_conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::task::yield_now().await;

        server_conn.send(b"push").await.expect("send should not block");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"push");

        client_ws.send(Message::text("done".to_owned())).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got, Some(Frame::Data(b"done".to_vec())));
    }

    #[tokio::test]
    async fn test_websocket_client_ping_is_a_heartbeat() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Ping(Default::default())).await.unwrap();

        let got = server_conn.recv().await.expect("recv should succeed");
        assert_eq!(got, Some(Frame::Heartbeat));
    }

    #[tokio::test]
    async fn test_websocket_server_ping_reaches_client_and_pong_comes_back() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        server_conn.ping().await.expect("ping should send");

        // Reading the ping makes the client queue its pong.
        let msg = client_ws.next().await.unwrap().unwrap();
        assert!(msg.is_ping());
        client_ws.flush().await.unwrap();

        let got = server_conn.recv().await.expect("recv should succeed");
        assert_eq!(got, Some(Frame::Heartbeat));
    }

    #[tokio::test]
    async fn test_websocket_connection_ids_are_unique() {
        let (mut transport, addr) = bind_any().await;

        let server_handle = tokio::spawn(async move {
            let a = transport.accept().await.expect("first accept");
            let b = transport.accept().await.expect("second accept");
            (a, b)
        });

        let _c1 = connect_client(&addr).await;
        let _c2 = connect_client(&addr).await;
        let (a, b) = server_handle.await.unwrap();

        assert_ne!(a.id(), b.id());
    }
}
