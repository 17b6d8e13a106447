use std::time::{Duration, Instant};

use alloy_primitives::{Address, Bytes, Log, TxHash, TxKind};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain RPC request failed: {0}")]
    Rpc(#[from] alloy_transport::TransportError),
    #[error("invalid RPC url {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("transaction {hash} not confirmed after {waited:?}")]
    Timeout { hash: TxHash, waited: Duration },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// 已上链交易回执中与本服务相关的部分。
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
    pub logs: Vec<Log>,
}

/// Read-only view of the configured network.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ChainError>;
}

pub struct RpcChainClient {
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn connect(rpc_url: &str) -> Result<Self, ChainError> {
        let url: Url = rpc_url.parse().map_err(|err: url::ParseError| ChainError::InvalidRpcUrl {
            url: rpc_url.to_string(),
            reason: err.to_string(),
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(input),
            ..Default::default()
        };
        Ok(self.provider.call(request).await?)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(|receipt| TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// 轮询回执直至上链或超时；超时与 RPC 失败分别返回不同错误，
/// 调用方可据此选择继续等待还是重新提交。
pub async fn wait_for_receipt(
    chain: &dyn ChainClient,
    hash: TxHash,
    policy: ReceiptPolicy,
) -> Result<TxReceipt, ReceiptError> {
    let started = Instant::now();
    let polling = async {
        loop {
            if let Some(receipt) = chain.transaction_receipt(hash).await? {
                return Ok::<_, ChainError>(receipt);
            }
            debug!(target: "chain", tx_hash = %hash, "回执尚未就绪，继续等待");
            tokio::time::sleep(policy.poll_interval).await;
        }
    };

    match tokio::time::timeout(policy.timeout, polling).await {
        Ok(result) => {
            let receipt = result?;
            info!(
                target: "chain",
                tx_hash = %hash,
                block = ?receipt.block_number,
                success = receipt.success,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "交易已确认"
            );
            Ok(receipt)
        }
        Err(_) => Err(ReceiptError::Timeout {
            hash,
            waited: started.elapsed(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use alloy_primitives::B256;

    use super::*;

    /// 内存链：按地址返回代码，按 selector 返回 call 结果，回执在第 N 次查询后出现。
    #[derive(Default)]
    pub(crate) struct FakeChain {
        pub chain_id: u64,
        pub code: Mutex<HashMap<Address, Bytes>>,
        pub call_results: Mutex<HashMap<(Address, [u8; 4]), Bytes>>,
        pub receipts: Mutex<HashMap<TxHash, TxReceipt>>,
        pub receipt_after_polls: usize,
        pub receipt_polls: Mutex<usize>,
        pub calls: Mutex<Vec<(Address, Bytes)>>,
    }

    impl FakeChain {
        pub(crate) fn with_code(self, address: Address) -> Self {
            self.code
                .lock()
                .expect("code lock")
                .insert(address, Bytes::from_static(&[0x60, 0x80]));
            self
        }

        pub(crate) fn with_call_result(self, to: Address, selector: [u8; 4], output: Bytes) -> Self {
            self.call_results
                .lock()
                .expect("call lock")
                .insert((to, selector), output);
            self
        }

        pub(crate) fn with_receipt(self, receipt: TxReceipt) -> Self {
            self.receipts
                .lock()
                .expect("receipt lock")
                .insert(receipt.transaction_hash, receipt);
            self
        }

        pub(crate) fn deploy(&self, address: Address) {
            self.code
                .lock()
                .expect("code lock")
                .insert(address, Bytes::from_static(&[0x60, 0x80]));
        }
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn chain_id(&self) -> Result<u64, ChainError> {
            Ok(self.chain_id)
        }

        async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
            Ok(self
                .code
                .lock()
                .expect("code lock")
                .get(&address)
                .cloned()
                .unwrap_or_default())
        }

        async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
            self.calls.lock().expect("calls lock").push((to, input.clone()));
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&input[..4]);
            Ok(self
                .call_results
                .lock()
                .expect("call lock")
                .get(&(to, selector))
                .cloned()
                .unwrap_or_default())
        }

        async fn transaction_receipt(
            &self,
            hash: TxHash,
        ) -> Result<Option<TxReceipt>, ChainError> {
            let mut polls = self.receipt_polls.lock().expect("polls lock");
            *polls += 1;
            if *polls <= self.receipt_after_polls {
                return Ok(None);
            }
            Ok(self.receipts.lock().expect("receipt lock").get(&hash).cloned())
        }
    }

    fn receipt(hash: TxHash) -> TxReceipt {
        TxReceipt {
            transaction_hash: hash,
            block_number: Some(42),
            success: true,
            logs: Vec::new(),
        }
    }

    fn fast_policy(timeout_ms: u64) -> ReceiptPolicy {
        ReceiptPolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn waits_until_receipt_appears() {
        let hash = B256::repeat_byte(0x22);
        let chain = FakeChain {
            receipt_after_polls: 2,
            ..Default::default()
        }
        .with_receipt(receipt(hash));

        let found = wait_for_receipt(&chain, hash, fast_policy(1_000))
            .await
            .expect("receipt");
        assert_eq!(found.block_number, Some(42));
        assert_eq!(*chain.receipt_polls.lock().expect("polls lock"), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_receipt_times_out_with_hash() {
        let hash = B256::repeat_byte(0x33);
        let chain = FakeChain::default();

        let err = wait_for_receipt(&chain, hash, fast_policy(30))
            .await
            .expect_err("should time out");
        match err {
            ReceiptError::Timeout { hash: timed_out, waited } => {
                assert_eq!(timed_out, hash);
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn invalid_rpc_url_is_rejected() {
        assert!(matches!(
            RpcChainClient::connect("::not-a-url"),
            Err(ChainError::InvalidRpcUrl { .. })
        ));
    }
}
