use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafeAgentConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub safe: SafeConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "super::default_timezone_offset_hours")]
    pub timezone_offset_hours: i8,
    /// 输出每一次链上 RPC 请求（回执轮询期间会非常密集）。
    #[serde(default)]
    pub rpc_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: super::default_logging_level(),
            json: false,
            timezone_offset_hours: super::default_timezone_offset_hours(),
            rpc_trace: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "super::default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "super::default_rpc_url")]
    pub rpc_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: super::default_chain_id(),
            rpc_url: super::default_rpc_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub wallet_keys: Vec<WalletKeyEntry>,
    /// 多个加密私钥时按备注名选择；为空时交互选择。
    #[serde(default)]
    pub selected: Option<String>,
    #[serde(default = "super::default_password_env")]
    pub password_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            wallet_keys: Vec::new(),
            selected: None,
            password_env: super::default_password_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletKeyEntry {
    pub remark: String,
    pub encrypted: String,
}

/// Safe v1.4.1 canonical deployments (L2 singleton).
#[derive(Debug, Clone, Deserialize)]
pub struct SafeConfig {
    #[serde(default = "super::default_safe_version")]
    pub version: String,
    #[serde(default = "default_singleton")]
    pub singleton: Address,
    #[serde(default = "default_proxy_factory")]
    pub proxy_factory: Address,
    #[serde(default = "default_fallback_handler")]
    pub fallback_handler: Address,
    #[serde(default)]
    pub salt_nonce: u64,
}

fn default_singleton() -> Address {
    address!("0x29fcB43b46531BcA003ddC8FCB67FFE91900C762")
}

fn default_proxy_factory() -> Address {
    address!("0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67")
}

fn default_fallback_handler() -> Address {
    address!("0xfd0732Dc9E303f09fCEf3a7388Ad10A83459Ec99")
}

impl Default for SafeConfig {
    fn default() -> Self {
        Self {
            version: super::default_safe_version(),
            singleton: default_singleton(),
            proxy_factory: default_proxy_factory(),
            fallback_handler: default_fallback_handler(),
            salt_nonce: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "super::default_coordination_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "super::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            base_url: super::default_coordination_base_url(),
            api_key: None,
            request_timeout_ms: super::default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default = "super::default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "super::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "super::default_threshold")]
    pub threshold: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: super::default_receipt_timeout_secs(),
            poll_interval_ms: super::default_poll_interval_ms(),
            threshold: super::default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "super::default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: super::default_listen(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_listen: Option<String>,
}
