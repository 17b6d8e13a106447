use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde_json::{Value, json};

use super::abi::SafeTx;
use crate::api::PendingTransaction;

/// Safe >= 1.3 domain: `EIP712Domain(uint256 chainId,address verifyingContract)`.
pub fn safe_domain(chain_id: u64, safe: Address) -> Eip712Domain {
    Eip712Domain::new(None, None, Some(U256::from(chain_id)), Some(safe), None)
}

impl From<&PendingTransaction> for SafeTx {
    fn from(tx: &PendingTransaction) -> Self {
        SafeTx {
            to: tx.to,
            value: tx.value,
            data: tx.data(),
            operation: tx.operation,
            safeTxGas: tx.safe_tx_gas,
            baseGas: tx.base_gas,
            gasPrice: tx.gas_price,
            gasToken: tx.gas_token(),
            refundReceiver: tx.refund_receiver(),
            nonce: U256::from(tx.nonce),
        }
    }
}

pub fn safe_tx_hash(chain_id: u64, safe: Address, tx: &SafeTx) -> B256 {
    tx.eip712_signing_hash(&safe_domain(chain_id, safe))
}

/// `eth_signTypedData_v4` payload for a `SafeTx`.
pub fn safe_tx_typed_data(chain_id: u64, safe: Address, tx: &SafeTx) -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "SafeTx": [
                {"name": "to", "type": "address"},
                {"name": "value", "type": "uint256"},
                {"name": "data", "type": "bytes"},
                {"name": "operation", "type": "uint8"},
                {"name": "safeTxGas", "type": "uint256"},
                {"name": "baseGas", "type": "uint256"},
                {"name": "gasPrice", "type": "uint256"},
                {"name": "gasToken", "type": "address"},
                {"name": "refundReceiver", "type": "address"},
                {"name": "nonce", "type": "uint256"}
            ]
        },
        "primaryType": "SafeTx",
        "domain": {
            "chainId": U256::from(chain_id),
            "verifyingContract": safe
        },
        "message": {
            "to": tx.to,
            "value": tx.value.to_string(),
            "data": tx.data,
            "operation": tx.operation,
            "safeTxGas": tx.safeTxGas.to_string(),
            "baseGas": tx.baseGas.to_string(),
            "gasPrice": tx.gasPrice.to_string(),
            "gasToken": tx.gasToken,
            "refundReceiver": tx.refundReceiver,
            "nonce": tx.nonce.to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use alloy_dyn_abi::TypedData;
    use alloy_primitives::{Bytes, address};

    use super::*;

    const SAFE: Address = address!("0x5AFE3855358E112B5647B952709E6165e1c1eEEe");

    fn sample_tx() -> SafeTx {
        SafeTx {
            to: address!("0x897A99e53440703eF4817215821926F6067091f7"),
            value: U256::from(1_000_000_000_000_000u64),
            data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            operation: 0,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: U256::from(3),
        }
    }

    #[test]
    fn typed_data_payload_hashes_like_the_struct() {
        let tx = sample_tx();
        let payload = safe_tx_typed_data(84_532, SAFE, &tx);
        let typed: TypedData = serde_json::from_value(payload).expect("typed data");

        assert_eq!(
            typed.eip712_signing_hash().expect("hash"),
            safe_tx_hash(84_532, SAFE, &tx)
        );
    }

    #[test]
    fn hash_binds_chain_and_safe() {
        let tx = sample_tx();
        let base = safe_tx_hash(84_532, SAFE, &tx);
        assert_ne!(base, safe_tx_hash(8_453, SAFE, &tx));
        assert_ne!(base, safe_tx_hash(84_532, Address::ZERO, &tx));
    }
}
