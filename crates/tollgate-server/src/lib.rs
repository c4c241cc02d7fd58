//! HTTP surface for Tollgate
//!
//! [`Gateway`] owns the long-lived components; [`Server`] mounts the chain,
//! cost and budget routes over them.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod costs;
mod error;
mod gateway;
mod health;
mod request_context;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tollgate_config::Config;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use gateway::Gateway;
pub use request_context::{CALLER_CATEGORY_HEADER, CALLER_IDENTITY_HEADER, REQUEST_ID_HEADER, TENANT_HEADER};

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    pub fn new(config: &Config, gateway: &Gateway) -> Self {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let mut app = Router::new();

        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(tollgate_llm::chain_router(Arc::clone(gateway.executor())));
        app = app.merge(costs::cost_router(gateway.queries().clone()));

        // Innermost first
        app = app.layer(axum::middleware::from_fn(request_context::request_context_middleware));
        app = app.layer(TraceLayer::new_for_http());

        Self { router: app, listen_address }
    }

    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until the cancellation token fires, then finish in-flight requests
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated, draining connections");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tollgate_provider::ProviderRegistry;
    use tower::ServiceExt;

    use super::*;

    const CONFIG: &str = r#"
        [server]
        listen_address = "127.0.0.1:0"

        [providers.a]
        type = "openrouter"

        [chains.main]
        models = ["a/model-a"]

        [billing.thresholds]
        daily = "25.00"
    "#;

    fn router() -> (Router, Gateway) {
        let config = Config::from_toml(CONFIG).unwrap();
        let providers = ProviderRegistry::from_config(&config.providers).unwrap();
        let gateway = Gateway::build(&config, &providers).unwrap();
        let router = Server::new(&config, &gateway).into_router();
        (router, gateway)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_route_is_mounted() {
        let (router, _gateway) = router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn unknown_chain_is_not_found() {
        let (router, _gateway) = router();
        let request = Request::post("/v1/chains/nope/completions")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["type"], "not_found_error");
    }

    #[tokio::test]
    async fn configured_thresholds_are_reported() {
        let (router, gateway) = router();
        let response = router
            .oneshot(Request::get("/v1/budget/thresholds").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["thresholds"]["daily"], "25.00");
        assert!(body["thresholds"].get("monthly").is_none());

        gateway.shutdown().await;
    }
}
