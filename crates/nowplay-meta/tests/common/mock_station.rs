#![allow(dead_code)]

//! A tiny in-process Icecast stand-in. Handlers hand back ICY-framed bodies
//! with `icy-metaint: 1` so one audio byte separates metadata blocks and
//! tests stay byte-cheap.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Router;
use futures_util::StreamExt;
use nowplay_meta::{MetaEvent, WatchConfig, WatchSession};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Binds an ephemeral port and serves the router for the rest of the test.
pub async fn serve(router: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock station listener");
    let addr = listener.local_addr().expect("listener has no local addr");
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("mock station server failed");
    });
    (format!("http://{addr}"), server)
}

/// ICY body for `icy-metaint: 1`: one audio byte, then a length-prefixed
/// NUL-padded metadata block, per title. An empty title becomes a
/// zero-length heartbeat block.
pub fn icy_body(titles: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    for title in titles {
        body.push(0u8);
        if title.is_empty() {
            body.push(0u8);
            continue;
        }
        let mut block = format!("StreamTitle='{title}';").into_bytes();
        let len = block.len().div_ceil(16);
        block.resize(len * 16, 0);
        body.push(len as u8);
        body.extend_from_slice(&block);
    }
    body
}

pub fn icy_response(station: &str, description: &str, body: Vec<u8>) -> Response {
    let mut builder = Response::builder()
        .header("icy-metaint", "1")
        .header(header::CONTENT_TYPE, "audio/mpeg");
    if !station.is_empty() {
        builder = builder.header("icy-name", station);
    }
    if !description.is_empty() {
        builder = builder.header("icy-description", description);
    }
    builder
        .body(Body::from(body))
        .expect("failed to build icy response")
}

/// Like [`icy_response`] but the body never ends, for cancellation tests.
pub fn endless_icy_response(station: &str, head: Vec<u8>) -> Response {
    let stream = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(head))])
        .chain(futures_util::stream::pending());
    Response::builder()
        .header("icy-metaint", "1")
        .header("icy-name", station)
        .body(Body::from_stream(stream))
        .expect("failed to build endless icy response")
}

pub fn redirect_to(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .expect("failed to build redirect response")
}

/// A response with an audio content type but no `icy-metaint` header.
pub fn plain_audio_response() -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "audio/flac")
        .body(Body::from(vec![0u8; 64]))
        .expect("failed to build plain audio response")
}

/// Test-speed timings: real semantics, millisecond waits.
pub fn fast_config() -> WatchConfig {
    WatchConfig {
        probe_delay_ms: 2,
        poll_interval_secs: 1,
        ..WatchConfig::default()
    }
}

/// One event, with a hang guard. Panics if the session ends instead.
pub async fn next_event(session: &mut WatchSession) -> MetaEvent {
    timeout(Duration::from_secs(10), session.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session ended before the expected event")
}

/// Drains a session to its natural end, guarding against hangs.
pub async fn collect_events(mut session: WatchSession) -> Vec<MetaEvent> {
    let mut events = Vec::new();
    loop {
        match timeout(Duration::from_secs(10), session.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => return events,
            Err(_) => panic!("session produced no further event within 10s: {events:?}"),
        }
    }
}
