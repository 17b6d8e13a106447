use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{u64_flexible, u256_flexible};

/// 交易服务中尚未执行的多签交易。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub safe: Address,
    pub to: Address,
    #[serde(default, with = "u256_flexible")]
    pub value: U256,
    #[serde(default)]
    pub data: Option<Bytes>,
    #[serde(default)]
    pub operation: u8,
    #[serde(default, with = "u256_flexible")]
    pub safe_tx_gas: U256,
    #[serde(default, with = "u256_flexible")]
    pub base_gas: U256,
    #[serde(default, with = "u256_flexible")]
    pub gas_price: U256,
    #[serde(default)]
    pub gas_token: Option<Address>,
    #[serde(default)]
    pub refund_receiver: Option<Address>,
    #[serde(with = "u64_flexible")]
    pub nonce: u64,
    pub safe_tx_hash: B256,
    #[serde(default)]
    pub confirmations_required: Option<u64>,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
    #[serde(default)]
    pub is_executed: bool,
}

impl PendingTransaction {
    pub fn data(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }

    pub fn gas_token(&self) -> Address {
        self.gas_token.unwrap_or_default()
    }

    pub fn refund_receiver(&self) -> Address {
        self.refund_receiver.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: Address,
    #[serde(default)]
    pub signature: Option<Bytes>,
    #[serde(default)]
    pub signature_type: Option<String>,
    #[serde(default)]
    pub submission_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafeInfo {
    #[serde(with = "u64_flexible")]
    pub nonce: u64,
    #[serde(with = "u64_flexible")]
    pub threshold: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub signature: Bytes,
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn parses_transaction_service_page() {
        let body = r#"{
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{
                "safe": "0x5AFE3855358E112B5647B952709E6165e1c1eEEe",
                "to": "0x897A99e53440703eF4817215821926F6067091f7",
                "value": "1000",
                "data": null,
                "operation": 0,
                "gasToken": "0x0000000000000000000000000000000000000000",
                "safeTxGas": 0,
                "baseGas": 0,
                "gasPrice": "0",
                "refundReceiver": null,
                "nonce": 4,
                "safeTxHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                "confirmationsRequired": 2,
                "isExecuted": false,
                "confirmations": [{
                    "owner": "0x1111111111111111111111111111111111111111",
                    "submissionDate": "2024-05-01T10:00:00Z",
                    "signature": "0x0102",
                    "signatureType": "EOA"
                }]
            }]
        }"#;

        let page: Page<PendingTransaction> = serde_json::from_str(body).expect("page");
        assert_eq!(page.count, Some(1));
        let tx = &page.results[0];
        assert_eq!(tx.safe, address!("0x5AFE3855358E112B5647B952709E6165e1c1eEEe"));
        assert_eq!(tx.value, U256::from(1000));
        assert_eq!(tx.data(), Bytes::new());
        assert_eq!(tx.nonce, 4);
        assert_eq!(tx.refund_receiver(), Address::ZERO);
        assert_eq!(tx.confirmations.len(), 1);
        assert_eq!(
            tx.confirmations[0].signature,
            Some(Bytes::from(vec![0x01, 0x02]))
        );
    }
}
