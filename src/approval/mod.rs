//! Approval Sequencer: co-sign and execute a Safe's pending transaction.
//!
//! Steps run strictly in order and any failure aborts the run. Signature
//! submission and execution both take external effect, so a failed run
//! leaves the Safe in an unknown state that must be inspected rather than
//! blindly retried.

use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::{Address, B256, TxHash};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{CoordinationError, CoordinationService, PendingTransaction};
use crate::monitoring::events;
use crate::safe::{MultisigAccount, SafeError};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("no pending transaction for Safe {0}")]
    NoPendingTransaction(Address),
    #[error("pending transaction {hash} not found for Safe {safe}")]
    TransactionNotFound { safe: Address, hash: B256 },
    #[error(transparent)]
    Safe(#[from] SafeError),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

/// 从待执行列表中挑选要审批的交易。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingSelection {
    /// 取列表第一条（按 nonce 升序），假定同一时刻只有一笔待执行交易。
    #[default]
    First,
    ByHash(B256),
}

impl PendingSelection {
    pub fn select(
        &self,
        safe: Address,
        pending: Vec<PendingTransaction>,
    ) -> Result<PendingTransaction, ApprovalError> {
        match self {
            PendingSelection::First => pending
                .into_iter()
                .next()
                .ok_or(ApprovalError::NoPendingTransaction(safe)),
            PendingSelection::ByHash(hash) => pending
                .into_iter()
                .find(|tx| tx.safe_tx_hash == *hash)
                .ok_or(ApprovalError::TransactionNotFound { safe, hash: *hash }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub safe: Address,
    pub safe_tx_hash: B256,
    pub execution_tx: TxHash,
}

pub struct ApprovalSequencer {
    coordination: Arc<dyn CoordinationService>,
    selection: PendingSelection,
}

impl ApprovalSequencer {
    pub fn new(coordination: Arc<dyn CoordinationService>) -> Self {
        Self {
            coordination,
            selection: PendingSelection::default(),
        }
    }

    pub fn with_selection(mut self, selection: PendingSelection) -> Self {
        self.selection = selection;
        self
    }

    pub async fn approve_pending(
        &self,
        safe: &dyn MultisigAccount,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let address = safe.address();
        let started = Instant::now();
        events::approval_started(address);

        match self.run(safe).await {
            Ok(outcome) => {
                events::approval_completed(&outcome, started.elapsed());
                Ok(outcome)
            }
            Err(err) => {
                events::approval_failed(address, &err);
                Err(err)
            }
        }
    }

    async fn run(&self, safe: &dyn MultisigAccount) -> Result<ApprovalOutcome, ApprovalError> {
        let address = safe.address();
        if !safe.is_deployed().await? {
            return Err(SafeError::NotDeployed(address).into());
        }

        let pending = self.coordination.pending_transactions(address).await?;
        debug!(
            target: "approval",
            safe = %address,
            signer = %safe.signer(),
            pending = pending.len(),
            selection = ?self.selection,
            "已获取待执行交易"
        );
        if pending.len() > 1 && self.selection == PendingSelection::First {
            warn!(
                target: "approval",
                safe = %address,
                pending = pending.len(),
                "存在多笔待执行交易，按 nonce 取第一笔"
            );
        }
        let tx = self.selection.select(address, pending)?;

        let signature = safe.sign_transaction_hash(&tx).await?;
        self.coordination
            .confirm_transaction(tx.safe_tx_hash, &signature.data)
            .await?;
        info!(
            target: "approval",
            safe = %address,
            safe_tx_hash = %tx.safe_tx_hash,
            signer = %signature.signer,
            "确认签名已提交"
        );

        let execution_tx = safe.execute_transaction(&tx, &signature).await?;
        Ok(ApprovalOutcome {
            safe: address,
            safe_tx_hash: tx.safe_tx_hash,
            execution_tx,
        })
    }
}
