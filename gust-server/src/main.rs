use anyhow::{Context, Result};
use clap::Parser;
use gust_core::{load_model, prefetch_model};
use gust_server::{
    config::{Cli, Command, FetchArgs, KeepWarmArgs, LoggingArgs, ServeArgs},
    create_app,
    keep_warm::KeepWarm,
    AppState,
};
use hf_hub::api::tokio::Api;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingArgs) {
    // RUST_LOG wins over --log-level.
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.log_level))
        .unwrap_or_else(|e| {
            eprintln!(
                "WARN: '{}' is not a valid tracing filter ({e}); falling back to 'info'",
                logging.log_level
            );
            EnvFilter::new("info")
        });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn serve(args: ServeArgs) -> Result<()> {
    // Loaded once; every request shares this handle until shutdown.
    let model = load_model(&args.model.model, Api::new()?, args.model.device_map()).await?;
    let app = create_app(Arc::new(AppState::new(model)));

    let bind_address = args.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %listener.local_addr()?, "started server");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let paths = prefetch_model(&args.model.model, Api::new()?, args.model.device_map()).await?;
    info!(unet = %paths.unet.display(), "model files ready");
    Ok(())
}

async fn keep_warm(args: KeepWarmArgs) -> Result<()> {
    let job = KeepWarm::new(args.to_config())?;
    if args.once {
        Arc::new(job).ping_isolated().await;
    } else {
        job.run(shutdown_signal()).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.logging);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::KeepWarm(args) => keep_warm(args).await,
    }
}
