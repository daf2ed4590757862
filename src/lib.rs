//! zPod Engine - 组件部署流水线
//!
//! 为实验实例添加组件：解析部署参数、渲染 options 模板、调用 govc 导入，
//! 由五阶段流水线串联

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::env::constants::CLEANUP_INTERVAL_SECS;
use crate::state::app_state::{get_shutdown_token, trigger_shutdown};
use crate::state::AppState;

/// 启动 HTTP 服务，直到收到 Ctrl-C
pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "zPod engine listening");

    tokio::spawn(run_cleanup(state.clone()));

    let app = api::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let token = get_shutdown_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
            trigger_shutdown();
        }
        _ = token.cancelled() => {}
    }
}

/// 定期清理过期的流水线记录
async fn run_cleanup(state: Arc<AppState>) {
    let token = get_shutdown_token();
    let mut interval = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

    // 首次 tick 立即返回
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = state.pipelines.cleanup_stale().await;
                if removed > 0 {
                    info!(removed, "Removed stale pipeline records");
                }
            }
            _ = token.cancelled() => break,
        }
    }
}
