//! Integration tests for `HttpPhaseEndpoint`.
//!
//! Each test serves a single canned response from a local listener.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use core::time::Duration;

use beesto_core::{Error, Phase, PhaseEndpoint as _, PhaseRequest, collect_phase};
use beesto_providers::{HttpPhaseEndpoint, data_line};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Serves one request with `status_line` and `body`, returning the request body.
async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/ai/agent", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buffer = [0_u8; 1024];
        let request_body = loop {
            let read = socket.read(&mut buffer).await.unwrap();
            received.extend_from_slice(&buffer[..read]);
            let text = String::from_utf8_lossy(&received).into_owned();
            if let Some((head, rest)) = text.split_once("\r\n\r\n") {
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if rest.len() >= length {
                    break rest.to_owned();
                }
            }
            if read == 0 {
                break String::new();
            }
        };
        let response = format!(
            "{status_line}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{body}"
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request_body
    });
    (url, handle)
}

#[tokio::test]
async fn test_streamed_phase_is_decoded() {
    let body = format!(
        "{}{}{}{}",
        data_line(r#"{"content":"Hello"}"#),
        data_line("not-json"),
        data_line(r#"{"content":", world"}"#),
        data_line("[DONE]")
    );
    let (url, server) = serve_once("HTTP/1.1 200 OK", body).await;
    let endpoint = HttpPhaseEndpoint::new(url);

    let request = PhaseRequest::new(Phase::Analyze, "build a todo app");
    let events = endpoint.request(&request, CancellationToken::new()).await.unwrap();
    let text = collect_phase(events, |_| {}).await.unwrap();
    assert_eq!(text, "Hello, world");

    let sent = server.await.unwrap();
    assert!(sent.contains(r#""phase":"analyze""#));
    assert!(sent.contains(r#""userRequest":"build a todo app""#));
}

#[tokio::test]
async fn test_non_success_status_names_the_phase() {
    let (url, server) = serve_once("HTTP/1.1 502 Bad Gateway", "upstream down".to_owned()).await;
    let endpoint = HttpPhaseEndpoint::new(url);

    let request = PhaseRequest::new(Phase::Analyze, "anything");
    let error = endpoint
        .request(&request, CancellationToken::new())
        .await
        .err()
        .unwrap();

    assert!(matches!(error, Error::Endpoint { status: 502, .. }));
    assert_eq!(error.to_string(), "Analysis failed: 502 Bad Gateway");
    server.await.unwrap();
}

#[tokio::test]
async fn test_cancelled_before_send() {
    let endpoint = HttpPhaseEndpoint::new("http://127.0.0.1:9/unreachable");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = PhaseRequest::new(Phase::Plan, "anything");
    let result = endpoint.request(&request, cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_error_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/ai/agent", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buffer = [0_u8; 4096];
        drop(socket.read(&mut buffer).await.unwrap());
        socket
            .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 64\r\n\r\nupstream")
            .await
            .unwrap();
        sleep(Duration::from_secs(30)).await;
    });
    let endpoint = HttpPhaseEndpoint::new(url);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let request = PhaseRequest::new(Phase::Execute, "anything");
    let result = timeout(Duration::from_secs(5), endpoint.request(&request, cancel))
        .await
        .unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    server.abort();
}
