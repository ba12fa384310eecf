// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! runcelld — the runcell code-execution service.

use runcell_server::{config::Config, lifecycle, routes};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,runcell=debug"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "runcelld.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = Config::from_env();
    let _log_guard = init_tracing(&config);

    if !config.auth_enabled() {
        tracing::warn!("no API keys configured, authentication is DISABLED");
    }

    let bind_addr = config.bind_addr.clone();
    let (app, background) = match lifecycle::startup(config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("runcelld: startup failed: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = bind_addr, error = %e, "failed to bind");
            eprintln!("runcelld: failed to bind {bind_addr}: {e}");
            background.shutdown().await;
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = bind_addr, "runcelld listening");

    let router = routes::router(app);
    let serve = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    });

    let result = serve.await;
    background.shutdown().await;

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server error");
            std::process::ExitCode::FAILURE
        }
    }
}
