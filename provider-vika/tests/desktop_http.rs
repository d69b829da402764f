//! Connector over the reqwest client against a local HTTP server
//!
//! Status handling (retry on 429/5xx, API error envelopes) must survive the
//! real transport, not only the mocked one.

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::time::SystemClock;
use provider_vika::{RateLimiter, VikaConfig, VikaConnector, VikaError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers every request with `status` and `body`; returns the base URL and a hit counter.
async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.ok();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{}/fusion/v1", addr), hits)
}

fn connector(base_url: String, max_attempts: u32) -> VikaConnector {
    VikaConnector::new(
        Arc::new(ReqwestHttpClient::with_client(
            reqwest::Client::builder().no_proxy().build().unwrap(),
        )),
        Arc::new(RateLimiter::unthrottled(Arc::new(SystemClock))),
        VikaConfig::new("usk-test", "dstsnDVylQhjuBiSEo")
            .with_base_url(base_url)
            .with_max_attempts(max_attempts),
    )
}

#[tokio::test]
async fn test_server_errors_are_retried_then_reported() {
    let (base_url, hits) = serve(
        "503 Service Unavailable",
        r#"{"success":false,"code":503,"message":"busy"}"#,
    )
    .await;

    let err = connector(base_url, 2).find_by_id("rec1").await.unwrap_err();

    assert!(matches!(
        err,
        VikaError::RetriesExhausted {
            attempts: 2,
            status_code: 503
        }
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_api_error_envelope_reaches_caller() {
    let (base_url, hits) = serve(
        "400 Bad Request",
        r#"{"success":false,"code":301,"message":"Datasheet not found"}"#,
    )
    .await;

    let err = connector(base_url, 3).find_by_id("rec1").await.unwrap_err();

    match err {
        VikaError::ApiError { code, message } => {
            assert_eq!(code, 301);
            assert_eq!(message, "Datasheet not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
