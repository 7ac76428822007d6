//! Drive the server-side codec with a real WebSocket client over an in-memory pipe.

use futures_util::{SinkExt, StreamExt};
use skc_ws::{read_message, read_request, write_message, Response, WsError};
use tokio::io::{split, BufReader};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test(flavor = "current_thread")]
async fn client_handshake_and_messages() {
    let (client_io, server_io) = tokio::io::duplex(4096);

    let server = async move {
        let (read_half, mut write_half) = split(server_io);
        let mut reader = BufReader::new(read_half);

        let request = read_request(&mut reader).await.unwrap();
        assert!(request.is_get("/ws"));
        Response::upgrade(&request.headers)
            .unwrap()
            .write_to(&mut write_half)
            .await
            .unwrap();

        let first = read_message(&mut reader).await.unwrap();
        let second = read_message(&mut reader).await.unwrap();
        write_message(&mut write_half, b"b\x01").await.unwrap();

        // The client's close frame is not a data frame.
        let err = read_message(&mut reader).await.unwrap_err();
        (first, second, err)
    };

    let client = async move {
        let (mut ws, response) = tokio_tungstenite::client_async("ws://skc.local/ws", client_io)
            .await
            .unwrap();
        assert_eq!(response.status(), 101);

        ws.send(Message::binary(b"U\x02\x00\x00\x00\x01".to_vec()))
            .await
            .unwrap();
        ws.send(Message::text("Mabc")).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply.into_data().as_ref(), b"b\x01");
        let _ = ws.close(None).await;
    };

    let ((first, second, err), ()) = tokio::join!(server, client);
    assert_eq!(first, b"U\x02\x00\x00\x00\x01");
    assert_eq!(second, b"Mabc");
    assert!(matches!(err, WsError::UnsupportedOpcode(0x8)));
    assert!(err.is_protocol_fault());
}
