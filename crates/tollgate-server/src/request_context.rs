use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderMap;
use tollgate_core::RequestContext;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CALLER_CATEGORY_HEADER: &str = "x-caller-category";
pub const CALLER_IDENTITY_HEADER: &str = "x-caller-identity";
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Middleware that attaches caller attribution to the request
///
/// Missing tags fall back to the anonymous context. A request id that is
/// not a UUID is ignored and a fresh correlation id is used instead.
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let context = context_from(request.headers());
    request.extensions_mut().insert(context);

    next.run(request).await
}

fn context_from(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    };

    let anonymous = RequestContext::anonymous();
    let mut context = RequestContext::new(
        header(CALLER_CATEGORY_HEADER).unwrap_or(anonymous.caller_category),
        header(CALLER_IDENTITY_HEADER).unwrap_or(anonymous.caller_identity),
    );

    if let Some(id) = header(REQUEST_ID_HEADER).and_then(|v| Uuid::parse_str(&v).ok()) {
        context = context.with_correlation_id(id);
    }
    if let Some(tenant) = header(TENANT_HEADER) {
        context = context.with_tenant(tenant);
    }

    context
}
