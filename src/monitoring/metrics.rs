use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

use super::events;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

/// 安装进程级 Prometheus 导出器，所有指标带上 `chain_id` 标签以区分部署网络；
/// 重复调用返回首次绑定的地址。
pub fn try_init_prometheus(listen: &str, chain_id: u64) -> Result<SocketAddr> {
    EXPORTER
        .get_or_try_init(|| {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("invalid prometheus listen address: {listen}"))?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .add_global_label("chain_id", chain_id.to_string())
                .install()
                .context("failed to install prometheus exporter")?;
            events::describe_metrics();
            PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
            Ok(addr)
        })
        .copied()
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_listen_address_is_rejected_without_enabling() {
        let err = try_init_prometheus("not-an-address", 84_532).expect_err("invalid");
        assert!(err.to_string().contains("invalid prometheus listen address"));
        assert!(!prometheus_enabled());
    }
}
