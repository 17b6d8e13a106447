use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use time::{UtcOffset, macros::format_description};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::args::InitCmd;
use crate::config::LoggingConfig;
use crate::config::loader::DEFAULT_CONFIG_PATHS;

const CONFIG_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/safe-agent.yaml"));

/// alloy 的 RPC 客户端在 debug 级别逐条打印请求；回执轮询会把日志刷满。
const RPC_TARGETS: &[&str] = &["alloy_rpc_client", "alloy_transport_http"];

/// 配置中显式写出的模块保持原样，其余 RPC 目标按 `rpc_trace` 统一调整。
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let rpc_level = if config.rpc_trace { "debug" } else { "info" };

    let targets = RPC_TARGETS
        .iter()
        .map(|module| (*module, rpc_level))
        .chain([("hyper_util::client::legacy", "warn")]);
    for (module, level) in targets {
        if config.level.contains(module) {
            continue;
        }
        if let Ok(directive) = format!("{module}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// 初始化 tracing，兼顾 JSON 与文本输出模式。
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config);

    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::from_hms(config.timezone_offset_hours, 0, 0).map_err(|err| {
        anyhow!(
            "invalid logging timezone offset {}: {err}",
            config.timezone_offset_hours
        )
    })?;
    let offset_timer = OffsetTime::new(offset, time_format);

    let base = fmt()
        .with_timer(offset_timer)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true)
        .with_level(true);

    if config.json {
        base.json()
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    } else {
        base.with_env_filter(filter)
            .event_format(fmt::format().compact())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }
    Ok(())
}

/// 写出配置模版；已存在的文件除非 `--force` 否则跳过。
pub fn init_configs(args: InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    fs::create_dir_all(&output_dir)?;

    let target_path = output_dir.join("safe-agent.yaml");
    if target_path.exists() && !args.force {
        println!(
            "跳过 {}（文件已存在，如需覆盖请加 --force）",
            target_path.display()
        );
        return Ok(());
    }

    fs::write(&target_path, CONFIG_TEMPLATE)?;
    println!("已写入 {}", target_path.display());
    Ok(())
}

/// 定位需要写回的配置文件：显式路径必须存在，否则按默认路径查找。
pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(anyhow!("指定的配置文件不存在: {}", path.display()));
    }

    for candidate in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(anyhow!(
        "未找到配置文件，请先运行 `safe-agent init` 或提供 --config <FILE>"
    ))
}
