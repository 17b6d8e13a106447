use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::SafeAgentConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["safe-agent.yaml", "config/safe-agent.yaml"];

pub const ENV_RPC_URL: &str = "SAFE_AGENT_RPC_URL";
pub const ENV_CHAIN_ID: &str = "SAFE_AGENT_CHAIN_ID";
pub const ENV_COORDINATION_URL: &str = "SAFE_TX_SERVICE_URL";
pub const ENV_COORDINATION_API_KEY: &str = "SAFE_TX_SERVICE_API_KEY";
pub const ENV_LISTEN: &str = "SAFE_AGENT_LISTEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value in environment variable {name}: {message}")]
    Env { name: &'static str, message: String },
    #[error("wallet: {0}")]
    Wallet(String),
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SafeAgentConfig,
    /// 实际加载的文件；未找到配置文件时为 None。
    pub path: Option<PathBuf>,
}

pub fn load_config(path: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    let mut loaded = LoadedConfig {
        config: SafeAgentConfig::default(),
        path: None,
    };
    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            info!(target: "config", path = %candidate.display(), "已加载配置文件");
            loaded = LoadedConfig {
                config,
                path: Some(candidate),
            };
            break;
        }
    }

    if loaded.path.is_none() {
        debug!(target: "config", "未找到配置文件，使用默认配置");
    }

    apply_env_overrides(&mut loaded.config, |name| env::var(name).ok())?;
    Ok(loaded)
}

fn try_load_file(path: &Path) -> Result<Option<SafeAgentConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = parse_config(&contents).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    Ok(Some(config))
}

pub fn parse_config(contents: &str) -> Result<SafeAgentConfig, String> {
    // 空文件按默认配置处理
    if contents.trim().is_empty() {
        return Ok(SafeAgentConfig::default());
    }
    serde_yaml::from_str(contents).map_err(|err| err.to_string())
}

/// 环境变量覆盖配置文件中的同名字段，适用于无状态部署环境。
pub fn apply_env_overrides<F>(config: &mut SafeAgentConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(url) = read(ENV_RPC_URL) {
        config.global.network.rpc_url = url;
    }
    if let Some(raw) = read(ENV_CHAIN_ID) {
        config.global.network.chain_id = raw.parse().map_err(|err| ConfigError::Env {
            name: ENV_CHAIN_ID,
            message: format!("{err}"),
        })?;
    }
    if let Some(url) = read(ENV_COORDINATION_URL) {
        config.coordination.base_url = url;
    }
    if let Some(key) = read(ENV_COORDINATION_API_KEY) {
        config.coordination.api_key = Some(key);
    }
    if let Some(listen) = read(ENV_LISTEN) {
        config.server.listen = listen;
    }

    Ok(())
}
