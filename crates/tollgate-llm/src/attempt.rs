//! Per-attempt bookkeeping for a single chain run

use std::time::Duration;

use serde::Serialize;
use tollgate_provider::ProviderErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(ProviderErrorKind),
}

impl AttemptOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed(kind) => kind.as_str(),
        }
    }
}

/// One dispatch to one model; discarded once the chain completes
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Model as `provider/model`
    pub model: String,
    /// 1-based attempt number on this model
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

impl std::fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} {} {}ms",
            self.model,
            self.attempt,
            self.outcome.as_str(),
            self.latency.as_millis()
        )
    }
}

/// How many attempts one model received
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAttempts {
    pub model: String,
    pub attempts: u32,
}

/// Collapse attempt records into per-model counts, in chain order
pub fn summarize(records: &[AttemptRecord]) -> Vec<ModelAttempts> {
    let mut summary: Vec<ModelAttempts> = Vec::new();
    for record in records {
        match summary.last_mut() {
            Some(last) if last.model == record.model => last.attempts += 1,
            _ => summary.push(ModelAttempts {
                model: record.model.clone(),
                attempts: 1,
            }),
        }
    }
    summary
}

/// One line covering every attempt, for diagnostics
pub fn trail(records: &[AttemptRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attempts beyond the first, across the whole chain
pub fn retry_count(records: &[AttemptRecord]) -> u32 {
    u32::try_from(records.len().saturating_sub(1)).unwrap_or(u32::MAX)
}
