pub mod abi;
pub mod client;
pub mod provision;
pub mod signature;
pub mod tx;

use alloy_primitives::{Address, B256};
use thiserror::Error;

use crate::chain::ChainError;
use crate::transport::TransportError;

pub use client::{DeployedSafe, MultisigAccount, attach};
pub use provision::{ProvisionOutcome, SafeOwners, SafeProvisioner};

#[derive(Debug, Error)]
pub enum SafeError {
    #[error("Safe {0} is not deployed")]
    NotDeployed(Address),
    #[error("transport reported no signer address")]
    NoSigner,
    #[error("safeTxHash mismatch: service reported {expected}, computed {computed}")]
    HashMismatch { expected: B256, computed: B256 },
    #[error("invalid signature from {owner}: {reason}")]
    InvalidSignature { owner: Address, reason: String },
    #[error("not enough signatures to execute: have {have}, threshold {need}")]
    InsufficientSignatures { have: usize, need: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("ABI decode failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),
}
