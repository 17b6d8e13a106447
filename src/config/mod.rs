pub mod loader;
pub mod types;
pub mod wallet;

pub use loader::*;
pub use types::*;

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_timezone_offset_hours() -> i8 {
    0
}

/// Base Sepolia
pub(crate) fn default_chain_id() -> u64 {
    84_532
}

pub(crate) fn default_rpc_url() -> String {
    "https://sepolia.base.org".to_string()
}

pub(crate) fn default_password_env() -> String {
    "SAFE_AGENT_WALLET_PASSWORD".to_string()
}

pub(crate) fn default_safe_version() -> String {
    "1.4.1".to_string()
}

pub(crate) fn default_coordination_base_url() -> String {
    "https://safe-transaction-base-sepolia.safe.global/api".to_string()
}

pub(crate) fn default_request_timeout_ms() -> u64 {
    10_000
}

pub(crate) fn default_receipt_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_poll_interval_ms() -> u64 {
    2_000
}

pub(crate) fn default_threshold() -> usize {
    2
}

pub(crate) fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}
