//! Integration tests for the HTTP collector against a local mock server:
//! payload shape, authentication, and the response-to-outcome mapping.

use meterlog_rs::api::http::HttpCollector;
use meterlog_rs::api::{Collector, SendError};
use meterlog_rs::buffer::BatchEntry;
use meterlog_rs::reading::{Reading, ReadingIdentifier, ReadingTime};
use mockito::{Matcher, Server};
use serde_json::json;

fn entry(seq: u64, value: f64, secs: i64) -> BatchEntry {
    BatchEntry {
        seq,
        reading: Reading::new(value, ReadingTime::from_secs(secs), ReadingIdentifier::Nil),
    }
}

/// Tests that send posts the tuple payload to the per-uuid endpoint.
#[tokio::test]
async fn test_send_posts_tuple_payload() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/data/u-1.json")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "uuid": "u-1",
            "tuples": [[1_000, 1.5], [2_000, 2.5]]
        })))
        .with_status(200)
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    let batch = vec![entry(1, 1.5, 1), entry(2, 2.5, 2)];
    collector.send(&batch).await.unwrap();

    mock.assert_async().await;
}

/// Tests that a bearer token from the configuration reaches the wire.
#[tokio::test]
async fn test_bearer_token_is_attached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/data/u-1.json")
        .match_header("authorization", "Bearer s3cr3t")
        .with_status(200)
        .create_async()
        .await;

    let collector =
        HttpCollector::new(&server.url(), Some("s3cr3t".to_string()), 5, "u-1").unwrap();
    collector.send(&[entry(1, 1.0, 1)]).await.unwrap();

    mock.assert_async().await;
}

/// Tests that a server error is retryable.
#[tokio::test]
async fn test_server_error_is_retryable() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/data/u-1.json")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    let result = collector.send(&[entry(1, 1.0, 1)]).await;
    assert!(matches!(result, Err(SendError::Retryable(_))));
}

/// Tests that a client error is permanent.
#[tokio::test]
async fn test_client_error_is_permanent() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/data/u-1.json")
        .with_status(400)
        .with_body("bad tuple")
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    let result = collector.send(&[entry(1, 1.0, 1)]).await;
    assert!(matches!(result, Err(SendError::Permanent(_))));
}

/// Tests that a 409 carrying the duplicate timestamp turns into a
/// per-reading conflict.
#[tokio::test]
async fn test_conflict_body_names_the_duplicate() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/data/u-1.json")
        .with_status(409)
        .with_header("content-type", "application/json")
        .with_body(r#"{"duplicate_timestamp_ms": 2000}"#)
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    let result = collector.send(&[entry(1, 1.0, 2)]).await;
    assert_eq!(result, Err(SendError::Conflict { timestamp_ms: 2000 }));
}

/// Tests that an unreachable collector is a retryable failure, not a
/// permanent one.
#[tokio::test]
async fn test_unreachable_collector_is_retryable() {
    // Nothing listens on this port.
    let collector = HttpCollector::new("http://127.0.0.1:1", None, 1, "u-1").unwrap();
    let result = collector.send(&[entry(1, 1.0, 1)]).await;
    assert!(matches!(result, Err(SendError::Retryable(_))));
}

/// Tests that registration succeeds against a middleware without a ping
/// endpoint.
#[tokio::test]
async fn test_register_accepts_missing_ping_endpoint() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/ping")
        .with_status(404)
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    assert!(collector.register_device().await.is_ok());
}

/// Tests that rejected credentials disable the channel instead of
/// retrying forever.
#[tokio::test]
async fn test_register_auth_rejection_is_permanent() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/ping")
        .with_status(401)
        .create_async()
        .await;

    let collector = HttpCollector::new(&server.url(), None, 5, "u-1").unwrap();
    let result = collector.register_device().await;
    assert!(matches!(result, Err(SendError::Permanent(_))));
}
