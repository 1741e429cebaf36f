// Copyright 2024 The Imagevault Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use imagevault_config::server::OperationalMode;
use imagevault_config::Config;
use imagevault_error::{make_err, Code, Error};
use imagevault_meta::MetadataRepository;
use imagevault_server::metrics::AppMetrics;
use imagevault_server::rate_limit::RateLimiters;
use imagevault_server::{build_router, AppState};
use imagevault_service::ImageService;
use imagevault_store::ObjectStore;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "imagevault-server", about = "Image ingestion, deduplication, and delivery service")]
struct Cli {
    /// Path to a JSON5 configuration file. Defaults built-in if omitted.
    #[arg(long)]
    config: Option<String>,
}

fn init_tracing(logging: &imagevault_config::logging::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match logging.format {
        imagevault_config::logging::LogFormat::json => builder.json().init(),
        imagevault_config::logging::LogFormat::console => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);

    if config.server.mode == OperationalMode::check {
        tracing::info!("configuration valid; exiting (check mode)");
        return ExitCode::SUCCESS;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup or server error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Error> {
    let kv = imagevault_kv::open(&config.kv.backend).await?;
    let meta = Arc::new(MetadataRepository::new(kv));

    let store_config = config
        .store
        .clone()
        .ok_or_else(|| make_err!(Code::Fatal, "object store configuration is required"))?;
    let presign_expiry_seconds = store_config.presign_expiry_seconds;
    let store: Arc<dyn ObjectStore> = Arc::new(imagevault_store::open(&store_config, &config.health).await?);

    let service = Arc::new(ImageService::with_health_config(store, meta.clone(), config.image.clone(), &config.health));
    let limiters = Arc::new(RateLimiters::new(&config.rate_limit));
    let metrics = Arc::new(AppMetrics::new());
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    let state = AppState {
        service,
        meta,
        config: config.clone(),
        limiters,
        metrics,
        shutdown: cancel.clone(),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.listen_port))
        .await
        .map_err(|e| make_err!(Code::Fatal, "failed to bind port {}: {e}", config.server.listen_port))?;
    tracing::info!(port = config.server.listen_port, presign_expiry_seconds, "imagevault-server listening");

    let drain = Duration::from_secs(config.server.graceful_shutdown_drain_seconds);
    let serve_future = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal(cancel.clone()));

    match tokio::time::timeout(drain + Duration::from_secs(1), serve_future).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(make_err!(Code::Fatal, "server error: {e}")),
        Err(_) => {
            tracing::warn!(drain_seconds = drain.as_secs(), "graceful shutdown drain exceeded, forcing exit");
            Ok(())
        }
    }
}

/// Resolves once SIGINT/SIGTERM is received, cancelling the shared token
/// so in-flight C1/C2 calls observe it, then lets `axum::serve` drain
/// in-flight connections (bounded by the outer `tokio::time::timeout`).
async fn wait_for_shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
    cancel.cancel();
}
