use clap::Parser;
use plastination_dashboard::api::{router, AppState};
use plastination_dashboard::config::Config;
use plastination_dashboard::console;
use plastination_dashboard::dashboard::Dashboard;
use plastination_dashboard::runtime;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    runtime::init_tracing();
    let config = Config::parse();
    info!(
        "Starting dashboard: source={:?}, data={}ms, chart={}ms, history={}, ui={:?}",
        config.source, config.data_interval_ms, config.chart_interval_ms, config.history, config.ui
    );

    let dashboard = match Dashboard::from_config(&config) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("Failed to start dashboard: {}", e);
            std::process::exit(1);
        }
    };
    dashboard.polling.start();

    let cancel = CancellationToken::new();

    let web_handle = if config.web_enabled() {
        let addr = config.web_addr();
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                dashboard.polling.shutdown().await;
                std::process::exit(1);
            }
        };
        info!(
            "HTTP server listening on http://{}",
            listener.local_addr().unwrap_or(addr)
        );
        let app = router(AppState {
            dashboard: dashboard.clone(),
            shutdown: cancel.clone(),
        });
        let shutdown = cancel.clone();
        Some(tokio::spawn(async move {
            let res = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = res {
                error!("Server error: {}", e);
            }
        }))
    } else {
        None
    };

    let console_handle = if config.console_enabled() {
        let console_dashboard = dashboard.clone();
        let console_cancel = cancel.clone();
        let interval = config.chart_interval();
        Some(tokio::spawn(async move {
            console::run_console(console_dashboard, interval, console_cancel).await;
        }))
    } else {
        None
    };

    // The console quits on `q` by cancelling the token itself.
    tokio::select! {
        _ = runtime::shutdown_signal() => {}
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    if let Some(h) = web_handle {
        let _ = h.await;
    }
    if let Some(h) = console_handle {
        let _ = h.await;
    }
    dashboard.polling.shutdown().await;
    info!("Dashboard stopped");
}
