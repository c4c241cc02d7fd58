#![allow(dead_code)]

pub mod config;
pub mod mock_upstream;
pub mod server;

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tollgate_core::{CostEvent, GatewayEvent};

/// Poll `check` until it yields a value or two seconds pass
///
/// Cost recording happens off the request path, so tests wait for it.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 2s");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn completion_body() -> serde_json::Value {
    serde_json::json!({
        "messages": [{"role": "user", "content": "Hello"}],
        "max_tokens": 64
    })
}

/// Wait for the next `cost.recorded` event, skipping other topics
pub async fn next_cost_event(rx: &mut broadcast::Receiver<GatewayEvent>) -> CostEvent {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(GatewayEvent::CostRecorded(event)) => return event,
                Ok(_) => {}
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("cost event within 2s")
}
