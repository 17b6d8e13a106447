//! 进程级依赖容器：启动时构建一次，再以引用传入审批与部署流程。

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use thiserror::Error;
use tracing::info;

use crate::api::{CoordinationService, SafeTransactionServiceClient};
use crate::approval::{ApprovalError, ApprovalOutcome, ApprovalSequencer, PendingSelection};
use crate::chain::{ChainClient, ChainError, ReceiptPolicy, RpcChainClient};
use crate::config::wallet::UnlockedWallet;
use crate::config::{ProvisioningConfig, SafeAgentConfig, SafeConfig};
use crate::safe::{DeployedSafe, SafeError, SafeProvisioner, attach};
use crate::transport::TransportAdapter;
use crate::wallet::{LocalWalletBackend, WalletError};

const USER_AGENT: &str = concat!("safe-agent/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("RPC reports chain id {actual}, config expects {configured}")]
    ChainMismatch { configured: u64, actual: u64 },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct AgentContext {
    chain_id: u64,
    transport: TransportAdapter,
    chain: Arc<dyn ChainClient>,
    coordination: Arc<dyn CoordinationService>,
    safe: SafeConfig,
    provisioning: ProvisioningConfig,
}

impl AgentContext {
    pub fn new(
        chain_id: u64,
        transport: TransportAdapter,
        chain: Arc<dyn ChainClient>,
        coordination: Arc<dyn CoordinationService>,
        safe: SafeConfig,
        provisioning: ProvisioningConfig,
    ) -> Self {
        Self {
            chain_id,
            transport,
            chain,
            coordination,
            safe,
            provisioning,
        }
    }

    /// 所有入口共用的初始化：钱包后端、链客户端与交易服务客户端。
    pub async fn bootstrap(
        config: &SafeAgentConfig,
        wallet: UnlockedWallet,
    ) -> Result<Self, AgentError> {
        let network = &config.global.network;
        let chain = RpcChainClient::connect(&network.rpc_url)?;
        let actual = chain.chain_id().await?;
        if actual != network.chain_id {
            return Err(AgentError::ChainMismatch {
                configured: network.chain_id,
                actual,
            });
        }

        let backend = LocalWalletBackend::connect(wallet.signer, network)?;
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let coordination = SafeTransactionServiceClient::new(http, &config.coordination);

        info!(
            target: "context",
            chain_id = actual,
            wallet = %wallet.remark,
            coordination = %config.coordination.base_url,
            "代理上下文已初始化"
        );

        Ok(Self::new(
            actual,
            TransportAdapter::new(Arc::new(backend)),
            Arc::new(chain),
            Arc::new(coordination),
            config.safe.clone(),
            config.provisioning.clone(),
        ))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn agent_address(&self) -> Result<Address, SafeError> {
        self.transport
            .request_addresses()
            .await?
            .first()
            .copied()
            .ok_or(SafeError::NoSigner)
    }

    pub async fn attach(&self, safe: Address) -> Result<DeployedSafe, SafeError> {
        attach(
            safe,
            self.transport.clone(),
            self.chain.clone(),
            self.chain_id,
        )
        .await
    }

    pub fn sequencer(&self, selection: PendingSelection) -> ApprovalSequencer {
        ApprovalSequencer::new(self.coordination.clone()).with_selection(selection)
    }

    /// 连接 Safe 并执行一次完整审批。
    pub async fn approve(
        &self,
        safe: Address,
        selection: PendingSelection,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let handle = self.attach(safe).await?;
        self.sequencer(selection).approve_pending(&handle).await
    }

    pub fn provisioner(&self) -> SafeProvisioner {
        SafeProvisioner::new(
            self.chain.clone(),
            self.transport.clone(),
            self.safe.clone(),
            ReceiptPolicy {
                timeout: Duration::from_secs(self.provisioning.receipt_timeout_secs),
                poll_interval: Duration::from_millis(self.provisioning.poll_interval_ms),
            },
        )
    }

    pub fn default_threshold(&self) -> usize {
        self.provisioning.threshold
    }
}
