//! One-time Safe bootstrap: predict the CREATE2 address for the owner set,
//! deploy through the proxy factory when nothing lives there yet, and read
//! the resulting proxy address back from the factory's `ProxyCreation` log.

use std::collections::HashSet;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, TxKind, U256, keccak256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_sol_types::{SolCall, SolEvent};
use thiserror::Error;
use tracing::{info, warn};

use super::abi::{ISafe, ISafeProxyFactory};
use crate::chain::{ChainClient, ChainError, ReceiptError, ReceiptPolicy, TxReceipt, wait_for_receipt};
use crate::config::SafeConfig;
use crate::monitoring::events;
use crate::transport::{TransportAdapter, TransportError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid Safe owners: {0}")]
    InvalidOwners(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("deployment submission failed: {0}")]
    Submission(#[source] TransportError),
    #[error("deployment confirmation failed: {0}")]
    Confirmation(#[source] ReceiptError),
    #[error("deployment transaction {0} reverted")]
    Reverted(TxHash),
    #[error("no ProxyCreation event in receipt of {0}")]
    ProxyCreationMissing(TxHash),
    #[error("ABI decode failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),
}

impl ProvisionError {
    /// 回执等待超时：交易可能仍会上链，调用方应继续观察而不是重发。
    pub fn is_confirmation_timeout(&self) -> bool {
        matches!(self, Self::Confirmation(ReceiptError::Timeout { .. }))
    }
}

/// 代理 Safe 的三个所有者；代理人始终是共同所有者。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeOwners {
    pub employer: Address,
    pub employee: Address,
    pub agent: Address,
}

impl SafeOwners {
    pub fn to_vec(&self) -> Vec<Address> {
        vec![self.employer, self.employee, self.agent]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigConfiguration {
    owners: Vec<Address>,
    threshold: usize,
}

impl MultisigConfiguration {
    pub fn new(owners: Vec<Address>, threshold: usize) -> Result<Self, ProvisionError> {
        if owners.is_empty() {
            return Err(ProvisionError::InvalidOwners("owner list is empty".to_string()));
        }
        if owners.contains(&Address::ZERO) {
            return Err(ProvisionError::InvalidOwners(
                "zero address cannot be an owner".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if !seen.insert(*owner) {
                return Err(ProvisionError::InvalidOwners(format!(
                    "duplicate owner {owner}"
                )));
            }
        }
        if threshold == 0 || threshold > owners.len() {
            return Err(ProvisionError::InvalidOwners(format!(
                "threshold {threshold} out of range 1..={}",
                owners.len()
            )));
        }
        Ok(Self { owners, threshold })
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedSafe {
    pub address: Address,
    pub initializer: Bytes,
    pub salt_nonce: U256,
    pub configuration: MultisigConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyDeployed(Address),
    Deployed { address: Address, tx_hash: TxHash },
}

pub struct SafeProvisioner {
    chain: Arc<dyn ChainClient>,
    transport: TransportAdapter,
    safe: SafeConfig,
    policy: ReceiptPolicy,
}

impl SafeProvisioner {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        transport: TransportAdapter,
        safe: SafeConfig,
        policy: ReceiptPolicy,
    ) -> Self {
        Self {
            chain,
            transport,
            safe,
            policy,
        }
    }

    /// `setup(owners, threshold, 0x0, 0x, fallbackHandler, 0x0, 0, 0x0)`
    pub fn initializer(&self, configuration: &MultisigConfiguration) -> Bytes {
        ISafe::setupCall {
            owners: configuration.owners.clone(),
            threshold: U256::from(configuration.threshold),
            to: Address::ZERO,
            data: Bytes::new(),
            fallbackHandler: self.safe.fallback_handler,
            paymentToken: Address::ZERO,
            payment: U256::ZERO,
            paymentReceiver: Address::ZERO,
        }
        .abi_encode()
        .into()
    }

    pub async fn predict(
        &self,
        configuration: &MultisigConfiguration,
    ) -> Result<PredictedSafe, ProvisionError> {
        let initializer = self.initializer(configuration);
        let salt_nonce = U256::from(self.safe.salt_nonce);

        let output = self
            .chain
            .call(
                self.safe.proxy_factory,
                ISafeProxyFactory::proxyCreationCodeCall {}.abi_encode().into(),
            )
            .await?;
        let creation_code = ISafeProxyFactory::proxyCreationCodeCall::abi_decode_returns(&output)?;

        let mut salt_preimage = Vec::with_capacity(64);
        salt_preimage.extend_from_slice(keccak256(&initializer).as_slice());
        salt_preimage.extend_from_slice(&salt_nonce.to_be_bytes::<32>());
        let salt = keccak256(&salt_preimage);

        let mut init_code = creation_code.to_vec();
        init_code.extend_from_slice(self.safe.singleton.into_word().as_slice());

        let address = self.safe.proxy_factory.create2_from_code(salt, &init_code);
        Ok(PredictedSafe {
            address,
            initializer,
            salt_nonce,
            configuration: configuration.clone(),
        })
    }

    pub async fn provision(
        &self,
        owners: &SafeOwners,
        threshold: usize,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let configuration = MultisigConfiguration::new(owners.to_vec(), threshold)?;
        let predicted = self.predict(&configuration).await?;

        if !self.chain.code_at(predicted.address).await?.is_empty() {
            info!(
                target: "safe::provision",
                safe = %predicted.address,
                "Safe 已部署，跳过部署"
            );
            events::safe_provisioned(predicted.address, "already_deployed");
            return Ok(ProvisionOutcome::AlreadyDeployed(predicted.address));
        }

        let request = TransactionRequest {
            to: Some(TxKind::Call(self.safe.proxy_factory)),
            value: Some(U256::ZERO),
            input: TransactionInput::new(
                ISafeProxyFactory::createProxyWithNonceCall {
                    singleton: self.safe.singleton,
                    initializer: predicted.initializer.clone(),
                    saltNonce: predicted.salt_nonce,
                }
                .abi_encode()
                .into(),
            ),
            ..Default::default()
        };

        info!(
            target: "safe::provision",
            predicted = %predicted.address,
            owners = ?configuration.owners(),
            threshold,
            version = %self.safe.version,
            "提交 Safe 部署交易"
        );
        let tx_hash = match self.transport.send_transaction(&request).await {
            Ok(hash) => hash,
            Err(err) => {
                events::safe_provisioned(predicted.address, "submission_failed");
                return Err(ProvisionError::Submission(err));
            }
        };

        let receipt = match wait_for_receipt(self.chain.as_ref(), tx_hash, self.policy).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    target: "safe::provision",
                    tx_hash = %tx_hash,
                    error = %err,
                    "部署交易未确认"
                );
                events::safe_provisioned(predicted.address, "unconfirmed");
                return Err(ProvisionError::Confirmation(err));
            }
        };
        if !receipt.success {
            events::safe_provisioned(predicted.address, "reverted");
            return Err(ProvisionError::Reverted(tx_hash));
        }

        let address = self.deployed_address(&receipt)?;
        if address != predicted.address {
            warn!(
                target: "safe::provision",
                predicted = %predicted.address,
                deployed = %address,
                "部署地址与预测地址不一致"
            );
        }
        info!(
            target: "safe::provision",
            safe = %address,
            tx_hash = %tx_hash,
            "Safe 部署完成"
        );
        events::safe_provisioned(address, "deployed");
        Ok(ProvisionOutcome::Deployed { address, tx_hash })
    }

    fn deployed_address(&self, receipt: &TxReceipt) -> Result<Address, ProvisionError> {
        receipt
            .logs
            .iter()
            .filter(|log| log.address == self.safe.proxy_factory)
            .find_map(|log| ISafeProxyFactory::ProxyCreation::decode_log_data(&log.data).ok())
            .map(|event| event.proxy)
            .ok_or(ProvisionError::ProxyCreationMissing(receipt.transaction_hash))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_primitives::{Log, address};
    use alloy_sol_types::SolValue;

    use super::*;
    use crate::chain::tests::FakeChain;
    use crate::transport::tests::{AGENT, BackendCall, RecordingBackend, SENT_TX_HASH};

    const EMPLOYER: Address = address!("0x1111111111111111111111111111111111111111");
    const EMPLOYEE: Address = address!("0x3333333333333333333333333333333333333333");

    fn owners() -> SafeOwners {
        SafeOwners {
            employer: EMPLOYER,
            employee: EMPLOYEE,
            agent: AGENT,
        }
    }

    fn chain_with_factory(config: &SafeConfig) -> FakeChain {
        FakeChain::default().with_call_result(
            config.proxy_factory,
            ISafeProxyFactory::proxyCreationCodeCall::SELECTOR,
            Bytes::from((Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),).abi_encode_params()),
        )
    }

    fn creation_receipt(config: &SafeConfig, proxy: Address, success: bool) -> TxReceipt {
        let event = ISafeProxyFactory::ProxyCreation {
            proxy,
            singleton: config.singleton,
        };
        TxReceipt {
            transaction_hash: SENT_TX_HASH,
            block_number: Some(7),
            success,
            logs: vec![Log {
                address: config.proxy_factory,
                data: event.encode_log_data(),
            }],
        }
    }

    fn provisioner(
        chain: Arc<FakeChain>,
        backend: Arc<RecordingBackend>,
        timeout: Duration,
    ) -> SafeProvisioner {
        SafeProvisioner::new(
            chain,
            TransportAdapter::new(backend),
            SafeConfig::default(),
            ReceiptPolicy {
                timeout,
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    fn sent_transactions(backend: &RecordingBackend) -> usize {
        backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::SendTransaction(_)))
            .count()
    }

    #[test]
    fn configuration_rejects_bad_owner_sets() {
        assert!(MultisigConfiguration::new(vec![], 1).is_err());
        assert!(MultisigConfiguration::new(vec![EMPLOYER, EMPLOYER], 1).is_err());
        assert!(MultisigConfiguration::new(vec![EMPLOYER, Address::ZERO], 1).is_err());
        assert!(MultisigConfiguration::new(vec![EMPLOYER, EMPLOYEE], 0).is_err());
        assert!(MultisigConfiguration::new(vec![EMPLOYER, EMPLOYEE], 3).is_err());

        let config = MultisigConfiguration::new(owners().to_vec(), 2).expect("valid");
        assert_eq!(config.owners(), &[EMPLOYER, EMPLOYEE, AGENT]);
        assert_eq!(config.threshold, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prediction_depends_on_owners_and_salt() {
        let config = SafeConfig::default();
        let chain = Arc::new(chain_with_factory(&config));
        let backend = Arc::new(RecordingBackend::default());
        let provisioner = provisioner(chain.clone(), backend.clone(), Duration::from_secs(1));

        let two_of_three = MultisigConfiguration::new(owners().to_vec(), 2).expect("config");
        let one_of_three = MultisigConfiguration::new(owners().to_vec(), 1).expect("config");
        let first = provisioner.predict(&two_of_three).await.expect("predict");
        let again = provisioner.predict(&two_of_three).await.expect("predict");
        let other = provisioner.predict(&one_of_three).await.expect("predict");

        assert_eq!(first.address, again.address);
        assert_ne!(first.address, other.address);
        let setup = ISafe::setupCall::abi_decode(&first.initializer).expect("setup");
        assert_eq!(setup.owners, vec![EMPLOYER, EMPLOYEE, AGENT]);
        assert_eq!(setup.fallbackHandler, config.fallback_handler);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn provisioning_is_idempotent() {
        let config = SafeConfig::default();
        let backend = Arc::new(RecordingBackend::default());
        let predicted = {
            let chain = Arc::new(chain_with_factory(&config));
            let configuration = MultisigConfiguration::new(owners().to_vec(), 2).expect("config");
            provisioner(chain, backend.clone(), Duration::from_secs(1))
                .predict(&configuration)
                .await
                .expect("predict")
                .address
        };

        let chain = Arc::new(
            chain_with_factory(&config).with_receipt(creation_receipt(&config, predicted, true)),
        );
        let provisioner = provisioner(chain.clone(), backend.clone(), Duration::from_secs(1));

        let first = provisioner.provision(&owners(), 2).await.expect("deploy");
        assert_eq!(
            first,
            ProvisionOutcome::Deployed {
                address: predicted,
                tx_hash: SENT_TX_HASH
            }
        );
        let calls = backend.calls();
        let Some(BackendCall::SendTransaction(request)) = calls.last() else {
            panic!("expected deployment transaction, got {calls:?}");
        };
        assert_eq!(request.to, Some(TxKind::Call(config.proxy_factory)));

        chain.deploy(predicted);
        let second = provisioner.provision(&owners(), 2).await.expect("idempotent");
        assert_eq!(second, ProvisionOutcome::AlreadyDeployed(predicted));
        assert_eq!(sent_transactions(&backend), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unconfirmed_deployment_times_out_with_hash() {
        let config = SafeConfig::default();
        let chain = Arc::new(chain_with_factory(&config));
        let backend = Arc::new(RecordingBackend::default());
        let provisioner = provisioner(chain, backend.clone(), Duration::from_millis(30));

        let err = provisioner.provision(&owners(), 2).await.expect_err("timeout");
        assert!(err.is_confirmation_timeout());
        assert!(matches!(
            err,
            ProvisionError::Confirmation(ReceiptError::Timeout { hash, .. }) if hash == SENT_TX_HASH
        ));
        assert_eq!(sent_transactions(&backend), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn submission_failure_never_waits_for_receipt() {
        let config = SafeConfig::default();
        let chain = Arc::new(chain_with_factory(&config));
        let backend = Arc::new(RecordingBackend {
            fail_sends: true,
            ..Default::default()
        });
        let provisioner = provisioner(chain.clone(), backend.clone(), Duration::from_millis(30));

        let err = provisioner.provision(&owners(), 2).await.expect_err("submission");
        assert!(matches!(
            err,
            ProvisionError::Submission(TransportError::Backend(_))
        ));
        assert!(!err.is_confirmation_timeout());
        assert_eq!(sent_transactions(&backend), 1);
        assert_eq!(*chain.receipt_polls.lock().expect("polls lock"), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reverted_and_eventless_receipts_fail() {
        let config = SafeConfig::default();
        let backend = Arc::new(RecordingBackend::default());

        let chain = Arc::new(
            chain_with_factory(&config).with_receipt(creation_receipt(&config, AGENT, false)),
        );
        let err = provisioner(chain, backend.clone(), Duration::from_secs(1))
            .provision(&owners(), 2)
            .await
            .expect_err("reverted");
        assert!(matches!(err, ProvisionError::Reverted(hash) if hash == SENT_TX_HASH));

        let mut receipt = creation_receipt(&config, AGENT, true);
        receipt.logs.clear();
        let chain = Arc::new(chain_with_factory(&config).with_receipt(receipt));
        let err = provisioner(chain, backend, Duration::from_secs(1))
            .provision(&owners(), 2)
            .await
            .expect_err("no event");
        assert!(matches!(err, ProvisionError::ProxyCreationMissing(_)));
    }

    #[test]
    fn rejects_invalid_owners_before_touching_chain() {
        let err = MultisigConfiguration::new(vec![AGENT, AGENT, EMPLOYER], 2).expect_err("dup");
        assert!(err.to_string().contains("duplicate owner"));
    }
}
