#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use args::Args;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tollgate_config::Config;
use tollgate_provider::{ModelCatalogValidator, ProviderRegistry};
use tollgate_server::{Gateway, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    let telemetry = tollgate_telemetry::init(config.telemetry.as_ref(), "info")?;

    tracing::info!(
        config_path = %args.config.display(),
        providers = config.providers.len(),
        chains = config.chains.len(),
        "starting tollgate"
    );

    let providers = ProviderRegistry::from_config(&config.providers)?;

    if args.skip_catalog_check {
        tracing::warn!("model catalog check skipped");
    } else {
        ModelCatalogValidator::new(&providers).validate(&config.chains).await?;
        tracing::info!("every chain model is offered upstream");
    }

    let gateway = Gateway::build(&config, &providers)?;
    let server = Server::new(&config, &gateway);

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let served = server.serve(shutdown).await;

    // Land whatever cost jobs are still queued even if serving failed
    gateway.shutdown().await;
    if let Err(e) = telemetry.force_flush() {
        tracing::warn!(error = %e, "final metrics flush failed");
    }
    served?;

    tracing::info!("tollgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
