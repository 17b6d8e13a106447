use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::SafeError;
use super::abi::{ISafe, SafeTx};
use super::signature::{SafeSignature, pack_signatures};
use super::tx::{safe_tx_hash, safe_tx_typed_data};
use crate::api::PendingTransaction;
use crate::chain::ChainClient;
use crate::transport::TransportAdapter;

/// 已部署 Safe 的操作句柄，绑定一个签名身份。
#[async_trait]
pub trait MultisigAccount: Send + Sync {
    fn address(&self) -> Address;

    fn signer(&self) -> Address;

    async fn is_deployed(&self) -> Result<bool, SafeError>;

    /// 对交易的 EIP-712 `SafeTx` 哈希签名；不会走 `personal_sign`。
    async fn sign_transaction_hash(
        &self,
        tx: &PendingTransaction,
    ) -> Result<SafeSignature, SafeError>;

    async fn execute_transaction(
        &self,
        tx: &PendingTransaction,
        own: &SafeSignature,
    ) -> Result<TxHash, SafeError>;
}

pub struct DeployedSafe {
    address: Address,
    signer: Address,
    chain_id: u64,
    chain: Arc<dyn ChainClient>,
    transport: TransportAdapter,
}

/// Attach to the Safe at `address` as the transport's first signer.
///
/// Never deploys; an address without code fails with [`SafeError::NotDeployed`].
pub async fn attach(
    address: Address,
    transport: TransportAdapter,
    chain: Arc<dyn ChainClient>,
    chain_id: u64,
) -> Result<DeployedSafe, SafeError> {
    let signer = transport
        .request_addresses()
        .await?
        .first()
        .copied()
        .ok_or(SafeError::NoSigner)?;

    let safe = DeployedSafe {
        address,
        signer,
        chain_id,
        chain,
        transport,
    };
    if !safe.is_deployed().await? {
        warn!(target: "safe", safe = %address, "目标地址没有合约代码");
        return Err(SafeError::NotDeployed(address));
    }

    debug!(target: "safe", safe = %address, signer = %signer, "已连接 Safe");
    Ok(safe)
}

impl DeployedSafe {
    async fn threshold(&self) -> Result<U256, SafeError> {
        let output = self
            .chain
            .call(self.address, ISafe::getThresholdCall {}.abi_encode().into())
            .await?;
        Ok(ISafe::getThresholdCall::abi_decode_returns(&output)?)
    }
}

#[async_trait]
impl MultisigAccount for DeployedSafe {
    fn address(&self) -> Address {
        self.address
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn is_deployed(&self) -> Result<bool, SafeError> {
        Ok(!self.chain.code_at(self.address).await?.is_empty())
    }

    async fn sign_transaction_hash(
        &self,
        tx: &PendingTransaction,
    ) -> Result<SafeSignature, SafeError> {
        let safe_tx = SafeTx::from(tx);
        let computed = safe_tx_hash(self.chain_id, self.address, &safe_tx);
        if computed != tx.safe_tx_hash {
            return Err(SafeError::HashMismatch {
                expected: tx.safe_tx_hash,
                computed,
            });
        }

        let payload = safe_tx_typed_data(self.chain_id, self.address, &safe_tx);
        let raw = self.transport.sign_typed_data(self.signer, &payload).await?;
        let signature = SafeSignature::from_ecdsa(self.signer, &raw)?;
        debug!(
            target: "safe",
            safe = %self.address,
            safe_tx_hash = %computed,
            "已签名 SafeTx"
        );
        Ok(signature)
    }

    async fn execute_transaction(
        &self,
        tx: &PendingTransaction,
        own: &SafeSignature,
    ) -> Result<TxHash, SafeError> {
        let mut signatures = Vec::with_capacity(tx.confirmations.len() + 1);
        signatures.push(own.clone());
        for confirmation in &tx.confirmations {
            if confirmation.owner == own.signer {
                continue;
            }
            // 合约签名或缺失签名的确认不参与拼接，是否够门限由下方检查决定
            match SafeSignature::from_confirmation(confirmation) {
                Ok(signature) => signatures.push(signature),
                Err(err) => warn!(
                    target: "safe",
                    owner = %confirmation.owner,
                    signature_type = ?confirmation.signature_type,
                    error = %err,
                    "跳过无法打包的确认签名"
                ),
            }
        }

        let packed = pack_signatures(signatures);
        let have = packed.len() / 65;
        let need = usize::try_from(self.threshold().await?).unwrap_or(usize::MAX);
        if have < need {
            return Err(SafeError::InsufficientSignatures { have, need });
        }

        let call = ISafe::execTransactionCall {
            to: tx.to,
            value: tx.value,
            data: tx.data(),
            operation: tx.operation,
            safeTxGas: tx.safe_tx_gas,
            baseGas: tx.base_gas,
            gasPrice: tx.gas_price,
            gasToken: tx.gas_token(),
            refundReceiver: tx.refund_receiver(),
            signatures: packed,
        };
        let request = TransactionRequest {
            from: Some(self.signer),
            to: Some(TxKind::Call(self.address)),
            input: TransactionInput::new(Bytes::from(call.abi_encode())),
            ..Default::default()
        };

        let hash = self.transport.send_transaction(&request).await?;
        info!(
            target: "safe",
            safe = %self.address,
            safe_tx_hash = %tx.safe_tx_hash,
            tx_hash = %hash,
            signatures = have,
            "execTransaction 已提交"
        );
        Ok(hash)
    }
}
