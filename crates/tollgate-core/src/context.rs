use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller attribution carried with every request through the gateway
///
/// The tags end up verbatim on the request's cost record, so they are what
/// the ledger can group by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation id shared by every attempt of one logical request
    pub correlation_id: Uuid,
    /// Coarse caller category (e.g. "summarizer", "chat")
    pub caller_category: String,
    /// Caller identity (service or user id)
    pub caller_identity: String,
    /// Optional tenant attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl RequestContext {
    /// Create a context with a fresh correlation id
    pub fn new(caller_category: impl Into<String>, caller_identity: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            caller_category: caller_category.into(),
            caller_identity: caller_identity.into(),
            tenant: None,
        }
    }

    /// Context for callers that supplied no attribution
    pub fn anonymous() -> Self {
        Self::new("uncategorized", "anonymous")
    }

    /// Attach a tenant tag
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Override the correlation id (e.g. from an inbound request id)
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_tags() {
        let id = Uuid::new_v4();
        let ctx = RequestContext::new("chat", "svc-a")
            .with_tenant("acme")
            .with_correlation_id(id);

        assert_eq!(ctx.caller_category, "chat");
        assert_eq!(ctx.caller_identity, "svc-a");
        assert_eq!(ctx.tenant.as_deref(), Some("acme"));
        assert_eq!(ctx.correlation_id, id);
    }

    #[test]
    fn fresh_contexts_get_distinct_ids() {
        assert_ne!(
            RequestContext::anonymous().correlation_id,
            RequestContext::anonymous().correlation_id
        );
    }
}
