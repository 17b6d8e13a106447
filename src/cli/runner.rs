use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::approval::PendingSelection;
use crate::cli::args::{ApproveCmd, Cli, Command, ProvisionCmd, ServeCmd};
use crate::cli::context::{init_configs, init_tracing};
use crate::cli::wallet::handle_wallet_command;
use crate::config::wallet::unlock_wallet;
use crate::config::{LoadedConfig, SafeAgentConfig, load_config};
use crate::context::AgentContext;
use crate::safe::{ProvisionOutcome, SafeOwners};

pub async fn run(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        command,
    } = cli;
    let LoadedConfig { config, path } = load_config(config_path.clone())?;
    init_tracing(&config.global.logging)?;

    if let Some(listen) = config
        .monitoring
        .prometheus_listen
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let chain_id = config.global.network.chain_id;
        let addr = crate::monitoring::try_init_prometheus(listen, chain_id)?;
        info!(target: "monitoring::metrics", listen = %addr, chain_id, "Prometheus 导出器已启动");
    }

    match command {
        Command::Init(args) => init_configs(args),
        Command::Wallet(cmd) => handle_wallet_command(&cmd, config_path.or(path)),
        Command::Address => {
            let wallet = unlock_wallet(&config.wallet)?;
            println!("Wallet address: {}", wallet.signer.address());
            Ok(())
        }
        Command::Serve(cmd) => {
            let context = bootstrap(&config).await?;
            serve(context, &config, cmd).await
        }
        Command::Approve(cmd) => {
            let context = bootstrap(&config).await?;
            approve(&context, cmd).await
        }
        Command::Provision(cmd) => {
            let context = bootstrap(&config).await?;
            provision(&context, cmd).await
        }
    }
}

async fn bootstrap(config: &SafeAgentConfig) -> Result<AgentContext> {
    let wallet = unlock_wallet(&config.wallet)?;
    AgentContext::bootstrap(config, wallet)
        .await
        .context("初始化代理上下文失败")
}

async fn serve(context: AgentContext, config: &SafeAgentConfig, cmd: ServeCmd) -> Result<()> {
    let listen = cmd
        .listen
        .unwrap_or_else(|| config.server.listen.clone());
    crate::server::serve(Arc::new(context), &listen).await
}

async fn approve(context: &AgentContext, cmd: ApproveCmd) -> Result<()> {
    let selection = cmd
        .safe_tx_hash
        .map(PendingSelection::ByHash)
        .unwrap_or_default();
    let outcome = context
        .approve(cmd.safe, selection)
        .await
        .with_context(|| format!("审批 Safe {} 失败", cmd.safe))?;

    println!("safeTxHash: {}", outcome.safe_tx_hash);
    println!("execTransaction: {}", outcome.execution_tx);
    Ok(())
}

async fn provision(context: &AgentContext, cmd: ProvisionCmd) -> Result<()> {
    let owners = SafeOwners {
        employer: cmd.employer,
        employee: cmd.employee,
        agent: context.agent_address().await?,
    };
    let threshold = cmd.threshold.unwrap_or_else(|| context.default_threshold());

    match context.provisioner().provision(&owners, threshold).await {
        Ok(ProvisionOutcome::AlreadyDeployed(address)) => {
            info!(target: "safe::provision", safe = %address, "Safe 已存在");
            println!("Safe already deployed: {address}");
            Ok(())
        }
        Ok(ProvisionOutcome::Deployed { address, tx_hash }) => {
            println!("Safe deployed: {address}");
            println!("deployment tx: {tx_hash}");
            Ok(())
        }
        Err(err) if err.is_confirmation_timeout() => {
            warn!(target: "safe::provision", error = %err, "部署交易确认超时");
            Err(anyhow!(
                "{err}; 交易可能仍在打包，请在链上确认后重新执行 provision（已部署时会直接跳过）"
            ))
        }
        Err(err) => Err(err).context("部署 Safe 失败"),
    }
}
