use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use syndic::metrics;
use syndic::scheduler::{CycleOutcome, CycleTrigger};

use super::context::AppContext;

/// Run a single cycle and print what happened
pub async fn run_once(ctx: AppContext) -> Result<()> {
    println!("Running one cycle");
    println!("=================");

    let outcome = ctx
        .scheduler
        .run_cycle()
        .await
        .context("Scheduler state store unavailable")?;

    match outcome {
        CycleOutcome::Paused => {
            println!("Scheduler is paused; nothing ran. Use `syndic resume` or `syndic force-run`.");
        }
        CycleOutcome::AlreadyRunning => {
            println!("Another cycle holds the run lock; nothing ran.");
        }
        CycleOutcome::Completed {
            report,
            next_delay,
            next_run,
        } => {
            println!("  Sources processed: {}", report.processed);
            println!("  Posts imported:    {}", report.imported);
            println!("  Failures:          {}", report.failures);
            println!("  Sources disabled:  {}", report.disabled);
            println!(
                "  Next run:          {} (in {}s)",
                next_run.format("%Y-%m-%d %H:%M:%S UTC"),
                next_delay.as_secs()
            );
        }
        CycleOutcome::Failed {
            reason,
            next_delay,
            next_run,
        } => {
            println!("Cycle failed: {reason}");
            println!(
                "  Retry at {} (in {}s)",
                next_run.format("%Y-%m-%d %H:%M:%S UTC"),
                next_delay.as_secs()
            );
        }
    }

    Ok(())
}

/// Run cycles until Ctrl+C, optionally serving Prometheus metrics
pub async fn daemon(ctx: AppContext, metrics_addr: Option<SocketAddr>) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    println!("Starting syndic daemon");
    println!("======================");
    println!(
        "  Database: {}",
        ctx.config.database.sqlite_path.display()
    );
    println!("  State backend: {:?}", ctx.config.state.backend);
    println!(
        "  Poll interval: {}s",
        ctx.config.scheduler.poll_interval_secs
    );
    if let Some(addr) = metrics_addr {
        println!("  Metrics: http://{addr}/metrics");
    }
    println!("Press Ctrl+C to stop.\n");

    let server = match metrics_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind to {addr}"))?;
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, metrics_router()).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }))
        }
        None => None,
    };

    let trigger = CycleTrigger::new(
        Arc::clone(&ctx.scheduler),
        ctx.activity.clone(),
        ctx.config.logging.retention_days,
    );
    let cycles = trigger
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    if let Some(handle) = server {
        handle.abort();
    }

    println!("Daemon stopped after {cycles} cycles.");
    Ok(())
}

fn metrics_router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "syndic",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        ),
    }
}
