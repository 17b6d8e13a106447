//! HTTP surface: `POST /api/sign` runs one approval, `GET /api/agent`
//! reports the agent wallet address.

mod handlers;
mod router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::context::AgentContext;

pub use router::build_router;

pub const SAFE_ADDRESS_REQUIRED: &str = "Safe address is required";
pub const APPROVAL_FAILED: &str = "Failed to create multisig agent.";
pub const WALLET_ADDRESS_FAILED: &str = "Failed to get wallet address.";

/// 监听直至收到 Ctrl-C。
pub async fn serve(context: Arc<AgentContext>, listen: &str) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let local = listener.local_addr().context("listener has no local address")?;
    info!(target: "server", listen = %local, chain_id = context.chain_id(), "HTTP 服务已启动");

    axum::serve(listener, build_router(context))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    info!(target: "server", "HTTP 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "server", error = %err, "监听 Ctrl-C 失败");
        std::future::pending::<()>().await;
    }
}
