use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use latch_expiration::TtlScheduler;
use latch_server::api::{self, AppState};
use latch_server::config::LatchConfig;
use latch_server::handler::LockHandler;
use latch_server::metrics::RequestMetrics;
use latch_server::reporter::spawn_reporter;
use latch_server::{store_factory, tls};

/// Latch lock and presence registry server.
#[derive(Parser, Debug)]
#[command(name = "latch-server", about = "Distributed lock and presence registry")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "latch.toml")]
    config: String,

    /// Override the listen address.
    #[arg(long)]
    listen_address: Option<String>,

    /// Override the database connection URL.
    #[arg(long)]
    database_url: Option<String>,

    /// Override the database driver ("postgres" or "mysql").
    #[arg(long)]
    database_driver: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Log at info unless RUST_LOG narrows or widens it.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    // A missing config file is not an error; defaults plus CLI flags are
    // enough to run against a local database.
    let mut config: LatchConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "no config file, starting from defaults");
        LatchConfig::default()
    };

    // CLI overrides take precedence over the file.
    if let Some(listen_address) = cli.listen_address {
        config.listen_address = listen_address;
    }
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    if let Some(driver) = cli.database_driver {
        config.database.driver = driver;
    }

    // Connect the store and run migrations.
    let store = store_factory::create_store(&config.database).await?;

    let scheduler = TtlScheduler::new(Arc::clone(&store));
    let metrics = Arc::new(RequestMetrics::default());
    let (exit_tx, mut exit_rx) = mpsc::channel(1);
    let handler = Arc::new(LockHandler::new(store, scheduler, metrics, exit_tx));

    let reporter = spawn_reporter(
        Arc::clone(&handler),
        Duration::from_secs(config.metrics.report_interval_seconds),
    );

    let app = api::router(AppState {
        handler: Arc::clone(&handler),
    });

    let addr: SocketAddr = config.listen_address.parse()?;
    let handle = Handle::new();

    // Bring the listener down gracefully, letting in-flight requests
    // drain, when an operator signal arrives or the handler trips the
    // exit channel on an unrecoverable storage fault.
    tokio::spawn({
        let handle = handle.clone();
        async move {
            #[cfg(unix)]
            let sigterm = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(err) => {
                        error!(error = %err, "failed to register the SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<()>();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt signal received, shutting down");
                }
                () = sigterm => {
                    info!("termination signal received, shutting down");
                }
                _ = exit_rx.recv() => {
                    error!("unrecoverable storage error, shutting down");
                }
            }
            handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    match &config.tls {
        Some(tls_config) => {
            let rustls_config =
                RustlsConfig::from_config(Arc::new(tls::rustls_server_config(tls_config)?));
            info!(address = %addr, "latch-server listening (tls)");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(address = %addr, "latch-server listening");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    reporter.abort();
    info!("latch-server shut down");
    Ok(())
}
