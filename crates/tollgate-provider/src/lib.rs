//! Upstream provider clients
//!
//! Every provider classifies its failures into transient, permanent and
//! model-unavailable kinds, hands back a usage reference with each
//! response, and answers later usage lookups against that reference.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod catalog;
pub mod error;
pub mod provider;
pub mod registry;
pub mod types;

pub use catalog::{CatalogError, MissingModel, ModelCatalogValidator};
pub use error::{ProviderError, ProviderErrorKind, classify_status};
pub use provider::Provider;
pub use registry::ProviderRegistry;
pub use types::{ChatMessage, InferenceRequest, InferenceResponse, Invocation, UsageLookup};
