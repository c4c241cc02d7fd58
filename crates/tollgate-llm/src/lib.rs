//! Model chain execution for Tollgate
//!
//! A chain is an ordered list of interchangeable models. The executor tries
//! them in order, retrying transient failures with backoff, skipping models
//! that cannot serve the request, and stopping at the first permanent error.
//! With the `http` feature it also exposes the chain completion route.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod attempt;
pub mod error;
pub mod executor;
#[cfg(feature = "http")]
pub mod handler;

pub use attempt::{AttemptOutcome, AttemptRecord, ModelAttempts};
pub use error::{ChainError, ModelFailure, UnresolvedModel};
pub use executor::{ChainOutcome, ModelChainExecutor};
#[cfg(feature = "http")]
pub use handler::chain_router;
