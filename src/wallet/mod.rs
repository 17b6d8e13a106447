use alloy_dyn_abi::TypedData;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::NetworkConfig;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet RPC request failed: {0}")]
    Rpc(#[from] alloy_transport::TransportError),
    #[error("signing failed: {0}")]
    Signer(#[from] alloy_signer::Error),
    #[error("invalid RPC url {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },
}

/// 托管钱包后端：持有私钥，只对外暴露地址、发送交易与两类签名。
#[async_trait]
pub trait WalletBackend: Send + Sync {
    async fn address(&self) -> Result<Address, WalletError>;

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, WalletError>;

    /// EIP-191 个人消息签名，返回 65 字节 `r || s || v`。
    async fn sign_message(&self, message: &[u8]) -> Result<Bytes, WalletError>;

    /// EIP-712 结构化数据签名，返回 65 字节 `r || s || v`。
    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Bytes, WalletError>;
}

/// 由本地解锁的私钥与 HTTP provider 组成的钱包后端。
pub struct LocalWalletBackend {
    signer: PrivateKeySigner,
    provider: DynProvider,
    chain_id: u64,
}

impl LocalWalletBackend {
    pub fn connect(mut signer: PrivateKeySigner, network: &NetworkConfig) -> Result<Self, WalletError> {
        let url: Url = network
            .rpc_url
            .parse()
            .map_err(|err: url::ParseError| WalletError::InvalidRpcUrl {
                url: network.rpc_url.clone(),
                reason: err.to_string(),
            })?;

        signer.set_chain_id(Some(network.chain_id));
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(url)
            .erased();

        info!(
            target: "wallet",
            address = %signer.address(),
            chain_id = network.chain_id,
            rpc = %network.rpc_url,
            "钱包后端已就绪"
        );

        Ok(Self {
            signer,
            provider,
            chain_id: network.chain_id,
        })
    }
}

#[async_trait]
impl WalletBackend for LocalWalletBackend {
    async fn address(&self) -> Result<Address, WalletError> {
        Ok(self.signer.address())
    }

    async fn send_transaction(&self, mut request: TransactionRequest) -> Result<TxHash, WalletError> {
        request.from = Some(self.signer.address());
        request.chain_id.get_or_insert(self.chain_id);

        let pending = self.provider.send_transaction(request).await?;
        let hash = *pending.tx_hash();
        debug!(target: "wallet", tx_hash = %hash, "交易已广播");
        Ok(hash)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Bytes, WalletError> {
        let signature = self.signer.sign_message(message).await?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Bytes, WalletError> {
        let signature = self.signer.sign_dynamic_typed_data(payload).await?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}
