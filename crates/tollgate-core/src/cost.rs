use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RequestContext;

/// How trustworthy a cost record's figures are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Figures come from the provider's authoritative usage lookup
    Full,
    /// Lookup never resolved; figures are the best available estimate
    Degraded,
}

impl Accuracy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Degraded => "degraded",
        }
    }
}

/// Handle returned alongside a provider response for the later usage lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageReference {
    /// Provider that issued the reference
    pub provider: String,
    /// Provider-side generation/response id
    pub id: String,
}

impl UsageReference {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }
}

/// Authoritative usage for one provider call, on the provider's billing basis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_units: u64,
    pub output_units: u64,
    pub cost: Decimal,
}

/// Usage reported inline with a response
///
/// May be measured on a normalized basis that differs from billing, so it is
/// only ever used when the authoritative lookup fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEstimate {
    pub input_units: u64,
    pub output_units: u64,
    /// Cost the estimate implies, when it can be priced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
}

/// Immutable, append-only record of one completed request-attempt chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEvent {
    pub timestamp: Timestamp,
    pub correlation_id: Uuid,
    pub caller_category: String,
    pub caller_identity: String,
    /// Model that produced the final outcome, as `provider/model`
    pub model: String,
    pub input_units: u64,
    pub output_units: u64,
    pub cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub success: bool,
    pub retry_count: u32,
    pub accuracy: Accuracy,
}

impl CostEvent {
    /// Event built from an authoritative usage lookup
    pub fn from_usage(
        timestamp: Timestamp,
        context: &RequestContext,
        model: impl Into<String>,
        usage: &UsageRecord,
        success: bool,
        retry_count: u32,
    ) -> Self {
        Self {
            timestamp,
            correlation_id: context.correlation_id,
            caller_category: context.caller_category.clone(),
            caller_identity: context.caller_identity.clone(),
            model: model.into(),
            input_units: usage.input_units,
            output_units: usage.output_units,
            cost: usage.cost,
            tenant: context.tenant.clone(),
            success,
            retry_count,
            accuracy: Accuracy::Full,
        }
    }

    /// Event built from the inline estimate after the lookup gave up
    pub fn from_estimate(
        timestamp: Timestamp,
        context: &RequestContext,
        model: impl Into<String>,
        estimate: &UsageEstimate,
        success: bool,
        retry_count: u32,
    ) -> Self {
        Self {
            timestamp,
            correlation_id: context.correlation_id,
            caller_category: context.caller_category.clone(),
            caller_identity: context.caller_identity.clone(),
            model: model.into(),
            input_units: estimate.input_units,
            output_units: estimate.output_units,
            cost: estimate.cost.unwrap_or(Decimal::ZERO),
            tenant: context.tenant.clone(),
            success,
            retry_count,
            accuracy: Accuracy::Degraded,
        }
    }

    /// Zero-cost event for a chain that never reached a billable call
    pub fn unbilled(
        timestamp: Timestamp,
        context: &RequestContext,
        model: impl Into<String>,
        success: bool,
        retry_count: u32,
    ) -> Self {
        let usage = UsageRecord {
            input_units: 0,
            output_units: 0,
            cost: Decimal::ZERO,
        };
        Self::from_usage(timestamp, context, model, &usage, success, retry_count)
    }
}
