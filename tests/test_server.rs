//! End-to-end tests against a running server

use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use image_transformer::config::Config;
use image_transformer::server::Server;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn upload_bytes(path: &str, body: &[u8], connection: &str) -> Vec<u8> {
    let mut req = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: {connection}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    req.extend_from_slice(body);
    req
}

/// Split a raw response into its status code and body.
fn split_response(raw: &[u8]) -> (u16, Vec<u8>) {
    let headers_end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = std::str::from_utf8(&raw[..headers_end]).unwrap();
    let status = head.split_whitespace().nth(1).unwrap().parse().unwrap();
    (status, raw[headers_end + 4..].to_vec())
}

async fn send(addr: SocketAddr, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&upload_bytes(path, body, "close"))
        .await
        .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    split_response(&raw)
}

async fn start_server(cfg: Config) -> (Server, SocketAddr) {
    let server = Server::new(&cfg);
    let addr = server.start("127.0.0.1:0").await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn test_rotate_round_trip() {
    let (server, addr) = start_server(Config::default()).await;

    let (status, body) = send(addr, "/api/img/rotate-cw/0/0/10/20", &png(20, 10)).await;
    assert_eq!(status, 200);
    assert_eq!(image::load_from_memory(&body).unwrap().dimensions(), (10, 20));

    server.stop().await;
}

#[tokio::test]
async fn test_status_codes_over_the_wire() {
    let (server, addr) = start_server(Config::default()).await;

    let (status, body) = send(addr, "/api/img/flip-h/5/5/0/0", &png(20, 20)).await;
    assert_eq!(status, 204);
    assert!(body.is_empty());

    let (status, body) = send(addr, "/api/img/spin/0/0/1/1", &png(20, 20)).await;
    assert_eq!(status, 400);
    assert!(body.is_empty());

    let (status, _) = send(addr, "/api/img/flip-v/0/0/1/1", b"garbage").await;
    assert_eq!(status, 400);

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_upload_rejected_without_body() {
    let (server, addr) = start_server(Config::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = "POST /api/img/flip-h/0/0/1/1 HTTP/1.1\r\nContent-Length: 200000\r\n\r\n";
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let (status, _) = split_response(&raw);
    assert_eq!(status, 400);

    server.stop().await;
}

#[tokio::test]
async fn test_keep_alive_serves_multiple_requests() {
    let (server, addr) = start_server(Config::default()).await;
    let image = png(4, 2);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut pipelined = upload_bytes("/api/img/flip-h/0/0/10/10", &image, "keep-alive");
    pipelined.extend(upload_bytes("/api/img/rotate-cw/0/0/10/10", &image, "close"));
    stream.write_all(&pipelined).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw);

    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_saturated_server_returns_503() {
    let mut cfg = Config::default();
    cfg.server.max_in_flight = 1;
    let (server, addr) = start_server(cfg).await;

    // Holds the only permit: connected but never sends a request.
    let _idle = TcpStream::connect(addr).await.unwrap();

    // Give the accept loop time to take the idle connection first.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.in_flight(), 1);

    // The rejected client only reads, so the server never closes on unread
    // request bytes.
    let mut rejected = TcpStream::connect(addr).await.unwrap();
    let mut raw = Vec::new();
    rejected.read_to_end(&mut raw).await.unwrap();

    let (status, body) = split_response(&raw);
    assert_eq!(status, 503);
    assert!(body.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_permit_released_after_connection_closes() {
    let mut cfg = Config::default();
    cfg.server.max_in_flight = 1;
    let (server, addr) = start_server(cfg).await;

    for _ in 0..3 {
        let (status, _) = send(addr, "/api/img/flip-h/0/0/1/1", &png(2, 2)).await;
        assert_eq!(status, 200);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server.stop().await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let server = Server::new(&Config::default());

    let first = server.start("127.0.0.1:0").await.unwrap();
    let second = server.start("127.0.0.1:0").await.unwrap();

    assert_eq!(first, second);
    assert!(server.is_running().await);
    assert_eq!(server.local_addr().await, Some(first));

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let (server, addr) = start_server(Config::default()).await;

    server.stop().await;
    assert!(!server.is_running().await);
    assert_eq!(server.local_addr().await, None);

    assert!(TcpStream::connect(addr).await.is_err());

    // Stopping again is harmless.
    server.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (server, _) = start_server(Config::default()).await;
    server.stop().await;

    let addr = server.start("127.0.0.1:0").await.unwrap();
    let (status, _) = send(addr, "/api/img/flip-v/0/0/1/1", &png(2, 2)).await;
    assert_eq!(status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_final() {
    let (server, _) = start_server(Config::default()).await;

    server.dispose().await;
    server.dispose().await;

    assert!(!server.is_running().await);
    assert!(server.start("127.0.0.1:0").await.is_err());
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let server = Server::new(&Config::default());
    assert!(server.start("not-an-address").await.is_err());
    assert!(!server.is_running().await);
}
