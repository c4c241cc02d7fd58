/// Errors raised by the cost ledger and its store
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The backing store rejected or failed an operation
    #[error("cost store error: {0}")]
    Store(String),

    /// A query range whose end precedes its start
    #[error("invalid time range: {0}")]
    InvalidRange(String),
}

/// Errors raised when adjusting budget thresholds
#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    /// Limits must be strictly positive
    #[error("threshold limit must be greater than 0, got {0}")]
    InvalidLimit(rust_decimal::Decimal),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
