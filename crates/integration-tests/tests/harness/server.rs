//! Test server wrapper that starts Tollgate on a random port

use std::net::SocketAddr;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tollgate_config::Config;
use tollgate_core::GatewayEvent;
use tollgate_provider::{ModelCatalogValidator, ProviderRegistry};
use tollgate_server::{Gateway, Server};

pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    gateway: Option<Gateway>,
    serving: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Start a test server, checking the model catalog first like the binary
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let providers = ProviderRegistry::from_config(&config.providers)?;
        ModelCatalogValidator::new(&providers).validate(&config.chains).await?;

        let gateway = Gateway::build(&config, &providers)?;
        let server = Server::new(&config, &gateway);
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let serving = tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            gateway: Some(gateway),
            serving: Some(serving),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.gateway.as_ref().expect("gateway running").subscribe()
    }

    /// Stop serving, then wait for queued cost jobs to land
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(serving) = self.serving.take() {
            serving.await.ok();
        }
        if let Some(gateway) = self.gateway.take() {
            gateway.shutdown().await;
        }
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("request sent")
            .json()
            .await
            .expect("json body")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
