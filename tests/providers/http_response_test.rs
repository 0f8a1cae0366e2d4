//! Upstream error bodies are sanitised before they reach callers.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lcac::providers::{check_http_response, ProviderError};

async fn serve_once(status_line: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should expose local addr");

    let status_line = status_line.to_owned();
    let body = body.to_owned();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut read_buf = [0_u8; 1024];
            let _ = socket.read(&mut read_buf).await;

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{addr}/")
}

async fn status_error(status_line: &str, body: &str) -> ProviderError {
    let url = serve_once(status_line, body).await;
    let response = reqwest::get(url).await.expect("request should complete");
    match check_http_response(response).await {
        Ok(_) => panic!("response should fail on non-success status"),
        Err(err) => err,
    }
}

#[tokio::test]
async fn success_returns_body() {
    let url = serve_once("200 OK", "{\"ok\":true}").await;
    let response = reqwest::get(url).await.expect("request should complete");
    let body = check_http_response(response).await.expect("2xx is success");
    assert_eq!(body, "{\"ok\":true}");
}

#[tokio::test]
async fn api_key_in_error_body_is_masked() {
    let raw_key = format!("sk-{}", "a1".repeat(20));
    let err = status_error("401 Unauthorized", &format!("Incorrect API key provided: {raw_key}")).await;

    match err {
        ProviderError::HttpStatus { status, body } => {
            assert_eq!(status, 401);
            assert!(!body.contains(&raw_key));
            assert!(body.contains("[REDACTED]"));
        }
        other => panic!("expected http status error, got: {other}"),
    }
}

#[tokio::test]
async fn long_error_body_is_truncated() {
    let err = status_error("500 Internal Server Error", &"x".repeat(400)).await;

    match err {
        ProviderError::HttpStatus { body, .. } => {
            assert!(body.ends_with("...[truncated]"));
            assert!(body.len() < 400);
        }
        other => panic!("expected http status error, got: {other}"),
    }
}
