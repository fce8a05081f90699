//! End-to-end scenarios run over real loopback TCP sockets.

use async_trait::async_trait;
use duplexhttp::{upgrade_to_websocket, Handler, HttpContext, Server, ServerConfig, WebSocketHandler, WebSocketSession};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct HelloHandler;

#[async_trait]
impl Handler for HelloHandler {
    async fn handle(&self, ctx: &mut HttpContext<'_>) -> io::Result<()> {
        if ctx.request.target == "/" {
            ctx.response
                .send_string(&mut *ctx.writer, ctx.request, "Hello World!")
                .await?;
        }
        Ok(())
    }
}

struct EchoActor;

#[async_trait]
impl WebSocketHandler for EchoActor {
    async fn on_start(self: Box<Self>) -> Box<dyn WebSocketHandler> {
        self
    }

    async fn on_text(self: Box<Self>, session: &WebSocketSession, text: String) -> Box<dyn WebSocketHandler> {
        let _ = session.send_text(text).await;
        self
    }

    async fn on_binary(self: Box<Self>, session: &WebSocketSession, data: Vec<u8>) -> Box<dyn WebSocketHandler> {
        let _ = session.send_binary(data).await;
        self
    }
}

struct WebSocketEchoHandler;

#[async_trait]
impl Handler for WebSocketEchoHandler {
    async fn handle(&self, ctx: &mut HttpContext<'_>) -> io::Result<()> {
        if ctx.request.target == "/ws" {
            let _ = upgrade_to_websocket(ctx, Box::new(EchoActor), None).await;
        }
        Ok(())
    }
}

async fn spawn_test_server() -> std::net::SocketAddr {
    let server = Arc::new(Server::new(ServerConfig::default()));
    server
        .set_handlers(vec![
            Arc::new(WebSocketEchoHandler) as Arc<dyn Handler>,
            Arc::new(HelloHandler) as Arc<dyn Handler>,
        ])
        .await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = server.clone();
    tokio::spawn(async move { running.serve_listener(listener).await });
    addr
}

#[tokio::test]
async fn get_request_returns_hello_world() {
    let addr = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 \r\n"));
    assert!(response.ends_with("Hello World!"));
    assert!(response.contains("content-length: 12"));
}

#[tokio::test]
async fn missing_host_header_is_rejected() {
    let addr = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert_eq!(
        response,
        "HTTP/1.1 400 \r\ncontent-type: text/plain\r\ncontent-length: 54\r\nconnection: close\r\n\r\nMissing required Host header field in HTTP/1.1 request"
    );
}

fn build_client_frame(fin: bool, opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push((if fin { 0x80 } else { 0 }) | opcode);
    assert!(payload.len() < 126);
    out.push(0x80 | payload.len() as u8);
    out.extend_from_slice(&mask);
    for (i, &b) in payload.iter().enumerate() {
        out.push(b ^ mask[i % 4]);
    }
    out
}

async fn perform_websocket_handshake(client: &mut TcpStream) {
    client
        .write_all(
            b"GET /ws HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        )
        .await
        .unwrap();
    let mut buf = [0u8; 4096];
    let mut collected = Vec::new();
    loop {
        let n = client.read(&mut buf).await.unwrap();
        collected.extend_from_slice(&buf[..n]);
        if collected.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&collected);
    assert!(text.starts_with("HTTP/1.1 101"));
    assert!(text.to_lowercase().contains("sec-websocket-accept: s3pplmbitxaq9kygzzhzrbk+xoo="));
}

#[tokio::test]
async fn websocket_echo_and_close() {
    let addr = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    perform_websocket_handshake(&mut client).await;

    let mask = [0x12, 0x34, 0x56, 0x78];
    client
        .write_all(&build_client_frame(true, 0x1, b"hi", mask))
        .await
        .unwrap();

    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x81);
    let len = (header[1] & 0x7F) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(payload, b"hi");

    client
        .write_all(&build_client_frame(true, 0x8, &1000u16.to_be_bytes(), mask))
        .await
        .unwrap();
    let mut close_header = [0u8; 2];
    client.read_exact(&mut close_header).await.unwrap();
    assert_eq!(close_header[0] & 0x0F, 0x8);
}

#[tokio::test]
async fn fragmented_text_reassembly() {
    let addr = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    perform_websocket_handshake(&mut client).await;

    let mask = [0xAA, 0xBB, 0xCC, 0xDD];
    client.write_all(&build_client_frame(false, 0x1, b"hel", mask)).await.unwrap();
    client.write_all(&build_client_frame(true, 0x0, b"lo", mask)).await.unwrap();

    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x81);
    let len = (header[1] & 0x7F) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();
    assert_eq!(payload, b"hello");
}

#[tokio::test]
async fn unmasked_frame_is_protocol_error() {
    let addr = spawn_test_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    perform_websocket_handshake(&mut client).await;

    let mut bad_frame = vec![0x81u8, 0x02];
    bad_frame.extend_from_slice(b"hi");
    client.write_all(&bad_frame).await.unwrap();

    let mut header = [0u8; 2];
    client.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0] & 0x0F, 0x8);
    let len = (header[1] & 0x7F) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    assert_eq!(code, 1002);
}
