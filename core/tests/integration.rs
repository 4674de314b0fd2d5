//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background thread
//! with its own runtime, then drives the real `ReqwestAgent` through
//! `HttpClient` and `JsonRpc` over loopback HTTP.

use std::net::SocketAddr;

use mock_server::Echo;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use webfetch_core::{fetch, FetchError, HttpClient, HttpMethod, JsonRpc, RpcError};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

/// Answer one request with `status_line` and an empty body, bypassing axum
/// so the reason phrase is exactly what goes on the wire.
async fn start_raw_server(status_line: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let reply = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        socket.write_all(reply.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });

    addr
}

#[tokio::test]
async fn fetch_plain_body() {
    let addr = start_server();
    let response = fetch(&format!("http://{addr}/done")).await.unwrap();
    assert_eq!(response.code, 200);
    assert_eq!(response.phrase, "OK");
    assert_eq!(response.text(), "done");
}

#[tokio::test]
async fn fetch_head_has_empty_body() {
    let addr = start_server();
    let response = HttpClient::builder(format!("http://{addr}/done"))
        .method("HEAD")
        .build()
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(response.code, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn redirect_returned_when_not_following() {
    let addr = start_server();
    let response = fetch(&format!("http://{addr}/redirect")).await.unwrap();
    assert_eq!(response.code, 302);
    assert!(response.body.is_empty());
    assert_eq!(response.header("Location"), Some("/done"));
}

#[tokio::test]
async fn redirect_followed() {
    let addr = start_server();
    let response = HttpClient::builder(format!("http://{addr}/redirect"))
        .follow_redirect(true)
        .build()
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(response.code, 200);
    assert_eq!(response.text(), "done");
}

#[tokio::test]
async fn redirect_chain_within_budget() {
    let addr = start_server();
    let response = HttpClient::builder(format!("http://{addr}/redirect/3"))
        .follow_redirect(true)
        .build()
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(response.text(), "done");
}

#[tokio::test]
async fn redirect_loop_is_bounded() {
    let addr = start_server();
    let err = HttpClient::builder(format!("http://{addr}/loop"))
        .follow_redirect(true)
        .max_redirects(3)
        .build()
        .unwrap()
        .fetch()
        .await
        .unwrap_err();
    match err {
        FetchError::TooManyRedirects { max, url } => {
            assert_eq!(max, 3);
            assert!(url.ends_with("/loop"), "{url}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn post_form_body() {
    let addr = start_server();
    let client = HttpClient::builder(format!("http://{addr}/echo"))
        .postdata("a=1")
        .build()
        .unwrap();
    assert_eq!(client.method(), &HttpMethod::Post);

    let response = client.fetch().await.unwrap();
    let echo: Echo = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
    assert_eq!(echo.content_length.as_deref(), Some("3"));
    assert_eq!(echo.body, "a=1");
}

#[tokio::test]
async fn proxy_receives_absolute_uri() {
    let addr = start_server();
    let response = HttpClient::builder("http://upstream.invalid/echo")
        .proxy(("127.0.0.1", addr.port()))
        .build()
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(response.code, 200);
    let echo: Echo = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echo.uri, "http://upstream.invalid/echo");
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let err = fetch(&format!("http://{addr}/done")).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)), "{err}");
}

#[tokio::test]
async fn jsonrpc_round_trips() {
    let addr = start_server();
    let rpc = JsonRpc::new(format!("http://{addr}/jsonrpc")).unwrap();

    let echoed = rpc.method("echo").invoke(vec![json!(1), json!("two")]).await.unwrap();
    assert_eq!(echoed, json!([1, "two"]));

    let sum: f64 = rpc.call_as("add", vec![json!(1), json!(2)]).await.unwrap();
    assert_eq!(sum, 3.0);
    assert_eq!(rpc.next_id(), 2);
}

#[tokio::test]
async fn jsonrpc_remote_errors() {
    let addr = start_server();
    let rpc = JsonRpc::new(format!("http://{addr}/jsonrpc")).unwrap();

    let err = rpc.call("fail", vec![]).await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(err.to_string(), "failed");

    let err = rpc.call("fail_legacy", vec![]).await.unwrap_err();
    assert_eq!(err.to_string(), "some error");

    let err = rpc.call("nope", vec![]).await.unwrap_err();
    assert_eq!(err.to_string(), "method not found: nope");
}

#[tokio::test]
async fn jsonrpc_http_error() {
    let addr = start_server();
    let rpc = JsonRpc::new(format!("http://{addr}/missing")).unwrap();
    match rpc.call("foo", vec![]).await.unwrap_err() {
        RpcError::Http { code, message } => {
            assert_eq!(code, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn fetch_keeps_wire_reason_phrase() {
    let addr = start_raw_server("HTTP/1.1 404 Not found.").await;
    let response = fetch(&format!("http://{addr}/anything")).await.unwrap();
    assert_eq!(response.code, 404);
    assert_eq!(response.phrase, "Not found.");
}

#[tokio::test]
async fn jsonrpc_http_error_carries_wire_phrase() {
    let addr = start_raw_server("HTTP/1.1 404 Not found.").await;
    let rpc = JsonRpc::new(format!("http://{addr}/jsonrpc")).unwrap();
    match rpc.call("foo", vec![]).await.unwrap_err() {
        RpcError::Http { code, message } => {
            assert_eq!(code, 404);
            assert_eq!(message, "Not found.");
        }
        other => panic!("unexpected error: {other}"),
    }
}
