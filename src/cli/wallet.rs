use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

use crate::cli::args::WalletCmd;
use crate::cli::context::resolve_config_path;
use crate::config::parse_config;
use crate::config::wallet::add_wallet_entry_interactive;

pub fn handle_wallet_command(cmd: &WalletCmd, override_path: Option<PathBuf>) -> Result<()> {
    match cmd {
        WalletCmd::Add => handle_wallet_add(override_path),
    }
}

fn handle_wallet_add(override_path: Option<PathBuf>) -> Result<()> {
    let target_path = resolve_config_path(override_path)?;
    let contents = fs::read_to_string(&target_path)
        .map_err(|err| anyhow!("读取配置文件失败 {}: {err}", target_path.display()))?;
    let mut config = parse_config(&contents)
        .map_err(|err| anyhow!("解析配置文件失败 {}: {err}", target_path.display()))?;

    let unlocked = add_wallet_entry_interactive(&mut config.wallet, &target_path)
        .map_err(|err| anyhow!(err.to_string()))?;

    println!(
        "🔐 已新增钱包 [{}]，地址 {}",
        unlocked.remark,
        unlocked.signer.address()
    );
    println!("配置文件位置：{}", target_path.display());
    println!("请重新启动 safe-agent 以加载最新钱包。");
    Ok(())
}
