//! Event bus contract and the in-process broadcast implementation

use async_trait::async_trait;
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cost::CostEvent;
use crate::period::Period;

pub const TOPIC_COST_RECORDED: &str = "cost.recorded";
pub const TOPIC_THRESHOLD_EXCEEDED: &str = "cost.threshold_exceeded";

/// Payload of `cost.threshold_exceeded`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBreach {
    pub period: Period,
    /// Human-readable period key (e.g. `2025-03-09`)
    pub period_key: String,
    pub limit: Decimal,
    /// Running total for the period when the breach was detected
    pub total: Decimal,
    pub detected_at: Timestamp,
}

/// Events the gateway core publishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum GatewayEvent {
    #[serde(rename = "cost.recorded")]
    CostRecorded(CostEvent),
    #[serde(rename = "cost.threshold_exceeded")]
    ThresholdExceeded(ThresholdBreach),
}

impl GatewayEvent {
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::CostRecorded(_) => TOPIC_COST_RECORDED,
            Self::ThresholdExceeded(_) => TOPIC_THRESHOLD_EXCEEDED,
        }
    }
}

/// Destination for gateway events
///
/// Publishing is best-effort and never fails the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: GatewayEvent);
}

/// In-process event bus over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl BroadcastBus {
    /// Create a bus that buffers up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for BroadcastBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[async_trait]
impl EventSink for BroadcastBus {
    async fn publish(&self, event: GatewayEvent) {
        let topic = event.topic();
        if self.tx.send(event).is_err() {
            tracing::trace!(topic, "no subscribers for gateway event");
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::period::PeriodKind;

    fn breach() -> ThresholdBreach {
        let period = Period::containing(PeriodKind::Daily, Timestamp::UNIX_EPOCH);
        ThresholdBreach {
            period,
            period_key: period.key(),
            limit: dec!(10.00),
            total: dec!(12.50),
            detected_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = BroadcastBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(GatewayEvent::ThresholdExceeded(breach())).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic(), TOPIC_THRESHOLD_EXCEEDED);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = BroadcastBus::new(8);
        bus.publish(GatewayEvent::ThresholdExceeded(breach())).await;
    }

    #[test]
    fn serializes_with_topic_tag() {
        let json = serde_json::to_value(GatewayEvent::ThresholdExceeded(breach())).unwrap();
        assert_eq!(json["topic"], "cost.threshold_exceeded");
        assert_eq!(json["payload"]["period_key"], "1970-01-01");
    }
}
