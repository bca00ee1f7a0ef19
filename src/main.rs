use std::sync::Arc;

use anyhow::{Context, Result};
use zkstream_relay::artifacts::load_triple;
use zkstream_relay::{
    build_router, AppState, Config, Mode, Pipeline, RelayClient, SnarkjsProducer,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkstream_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let relay = RelayClient::new(config.relay.clone()).context("Failed to create relay client")?;

    match config.mode {
        Mode::Serve => serve(config, relay).await,
        Mode::Submit => submit_artifacts(config, relay).await,
    }
}

/// One-shot: submit the artifacts already on disk and print the receipt.
async fn submit_artifacts(config: Config, relay: RelayClient) -> Result<()> {
    tracing::info!(
        "Submitting artifacts from {} and {}",
        config.artifacts.proof.display(),
        config.artifacts.public_signals.display()
    );

    let triple = load_triple(&config.artifacts).await?;
    let request = config.profile.build(triple)?;
    let job = relay.run_job(&request).await?;

    tracing::info!("Job {} finalized after {} status checks", job.id, job.status_checks);
    println!("{}", serde_json::to_string_pretty(&job.receipt)?);
    Ok(())
}

async fn serve(config: Config, relay: RelayClient) -> Result<()> {
    tracing::info!(
        "Relay: {} (poll every {:?}, give up after {:?})",
        config.relay.base_url,
        config.relay.poll.interval,
        config.relay.poll.max_duration
    );

    let producer = Arc::new(SnarkjsProducer::new(config.prover.clone()));
    let pipeline = Pipeline::new(producer, config.profile.clone(), relay);
    let state = Arc::new(AppState {
        pipeline,
        request_deadline: config.request_deadline,
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("zkStream relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
