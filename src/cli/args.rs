use std::path::PathBuf;

use alloy_primitives::{Address, B256};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "safe-agent", version, about = "Safe 多签自动共签代理")]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 safe-agent.yaml 或 config/safe-agent.yaml）"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 启动 HTTP 服务（POST /api/sign）
    Serve(ServeCmd),
    /// 对指定 Safe 的待执行交易执行一次审批
    Approve(ApproveCmd),
    /// 一次性部署代理共管的 Safe
    Provision(ProvisionCmd),
    /// 打印代理钱包地址
    Address,
    /// 钱包管理
    #[command(subcommand)]
    Wallet(WalletCmd),
    /// 初始化配置模版文件
    Init(InitCmd),
}

#[derive(Args, Debug)]
pub struct ServeCmd {
    #[arg(long, value_name = "ADDR", help = "覆盖 server.listen，例如 127.0.0.1:3000")]
    pub listen: Option<String>,
}

#[derive(Args, Debug)]
pub struct ApproveCmd {
    #[arg(long, value_name = "ADDRESS", help = "目标 Safe 地址")]
    pub safe: Address,
    #[arg(
        long,
        value_name = "HASH",
        help = "只审批该 safeTxHash；默认取第一笔待执行交易"
    )]
    pub safe_tx_hash: Option<B256>,
}

#[derive(Args, Debug)]
pub struct ProvisionCmd {
    #[arg(long, value_name = "ADDRESS", help = "雇主地址")]
    pub employer: Address,
    #[arg(long, value_name = "ADDRESS", help = "雇员地址")]
    pub employee: Address,
    #[arg(long, help = "签名门限，默认取 provisioning.threshold")]
    pub threshold: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum WalletCmd {
    /// 交互式录入私钥并加密写入配置文件
    Add,
}

#[derive(Args, Debug)]
pub struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_approve_with_hash() {
        let cli = Cli::try_parse_from([
            "safe-agent",
            "--config",
            "custom.yaml",
            "approve",
            "--safe",
            "0x5AFE3855358E112B5647B952709E6165e1c1eEEe",
            "--safe-tx-hash",
            "0x2222222222222222222222222222222222222222222222222222222222222222",
        ])
        .expect("parse");

        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        let Command::Approve(cmd) = cli.command else {
            panic!("expected approve command");
        };
        assert_eq!(cmd.safe_tx_hash, Some(B256::repeat_byte(0x22)));
    }

    #[test]
    fn rejects_malformed_owner_address() {
        assert!(
            Cli::try_parse_from([
                "safe-agent",
                "provision",
                "--employer",
                "0x1234",
                "--employee",
                "0x3333333333333333333333333333333333333333",
            ])
            .is_err()
        );
    }
}
