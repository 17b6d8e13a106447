//! Wire-level wallet transport over a [`WalletBackend`].
//!
//! Multisig code talks to the agent's wallet exclusively through
//! [`TransportAdapter::request`] using the standard JSON-RPC method names.
//! Exactly three methods are answered; everything else is rejected with
//! [`TransportError::UnsupportedMethod`] and never reaches the backend.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, Bytes, TxHash, hex};
use alloy_rpc_types_eth::TransactionRequest;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitoring::events;
use crate::wallet::{WalletBackend, WalletError};

pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const PERSONAL_SIGN: &str = "personal_sign";
pub const ETH_SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMethod {
    SendTransaction,
    PersonalSign,
    SignTypedDataV4,
}

impl WireMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireMethod::SendTransaction => ETH_SEND_TRANSACTION,
            WireMethod::PersonalSign => PERSONAL_SIGN,
            WireMethod::SignTypedDataV4 => ETH_SIGN_TYPED_DATA_V4,
        }
    }
}

impl FromStr for WireMethod {
    type Err = TransportError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            ETH_SEND_TRANSACTION => Ok(WireMethod::SendTransaction),
            PERSONAL_SIGN => Ok(WireMethod::PersonalSign),
            ETH_SIGN_TYPED_DATA_V4 => Ok(WireMethod::SignTypedDataV4),
            other => Err(TransportError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for WireMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported transport method: {0}")]
    UnsupportedMethod(String),
    #[error("invalid params for {method}: {reason}")]
    InvalidParams {
        method: WireMethod,
        reason: String,
    },
    #[error("unexpected {method} result: {reason}")]
    InvalidResult {
        method: WireMethod,
        reason: String,
    },
    #[error("wallet backend error: {0}")]
    Backend(#[from] WalletError),
}

impl TransportError {
    fn invalid_params(method: WireMethod, reason: impl fmt::Display) -> Self {
        Self::InvalidParams {
            method,
            reason: reason.to_string(),
        }
    }

    fn invalid_result(method: WireMethod, reason: impl fmt::Display) -> Self {
        Self::InvalidResult {
            method,
            reason: reason.to_string(),
        }
    }
}

/// 无状态转发层，每个钱包后端实例绑定一次。
#[derive(Clone)]
pub struct TransportAdapter {
    backend: Arc<dyn WalletBackend>,
}

impl TransportAdapter {
    pub fn new(backend: Arc<dyn WalletBackend>) -> Self {
        Self { backend }
    }

    /// Signer identities this transport can act for.
    pub async fn request_addresses(&self) -> Result<Vec<Address>, TransportError> {
        Ok(vec![self.backend.address().await?])
    }

    pub async fn request(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        let wire = match method.parse::<WireMethod>() {
            Ok(wire) => wire,
            Err(err) => {
                warn!(target: "transport", method, "拒绝不支持的钱包请求");
                events::transport_request(method, "unsupported");
                return Err(err);
            }
        };

        let result = self.dispatch(wire, params).await;
        events::transport_request(wire.as_str(), if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn dispatch(&self, method: WireMethod, params: &[Value]) -> Result<Value, TransportError> {
        match method {
            WireMethod::SendTransaction => {
                let raw = params
                    .first()
                    .ok_or_else(|| TransportError::invalid_params(method, "missing transaction"))?;
                let request: TransactionRequest = serde_json::from_value(raw.clone())
                    .map_err(|err| TransportError::invalid_params(method, err))?;
                let hash = self.backend.send_transaction(request).await?;
                debug!(target: "transport", %method, tx_hash = %hash, "交易已提交");
                Ok(Value::String(hash.to_string()))
            }
            WireMethod::PersonalSign => {
                let raw = params
                    .first()
                    .ok_or_else(|| TransportError::invalid_params(method, "missing message"))?;
                let message = decode_message(raw)
                    .ok_or_else(|| TransportError::invalid_params(method, "message must be a string"))?;
                let signature = self.backend.sign_message(&message).await?;
                Ok(Value::String(signature.to_string()))
            }
            WireMethod::SignTypedDataV4 => {
                let raw = typed_data_param(params)
                    .ok_or_else(|| TransportError::invalid_params(method, "missing typed data"))?;
                let payload = parse_typed_data(raw)
                    .map_err(|err| TransportError::invalid_params(method, err))?;
                let signature = self.backend.sign_typed_data(&payload).await?;
                Ok(Value::String(signature.to_string()))
            }
        }
    }

    pub async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TxHash, TransportError> {
        let method = WireMethod::SendTransaction;
        let params = serde_json::to_value(request)
            .map_err(|err| TransportError::invalid_params(method, err))?;
        let result = self.request(method.as_str(), &[params]).await?;
        serde_json::from_value(result).map_err(|err| TransportError::invalid_result(method, err))
    }

    pub async fn sign_typed_data(
        &self,
        signer: Address,
        payload: &Value,
    ) -> Result<Bytes, TransportError> {
        let method = WireMethod::SignTypedDataV4;
        let params = [
            Value::String(signer.to_string()),
            Value::String(payload.to_string()),
        ];
        let result = self.request(method.as_str(), &params).await?;
        serde_json::from_value(result).map_err(|err| TransportError::invalid_result(method, err))
    }
}

/// `0x` 前缀按十六进制解码，其余按 UTF-8 原文签名。
fn decode_message(raw: &Value) -> Option<Vec<u8>> {
    let text = raw.as_str()?;
    if let Some(stripped) = text.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(stripped) {
            return Some(bytes);
        }
    }
    Some(text.as_bytes().to_vec())
}

/// 线上约定为 `[address, payload]`；首个参数不是地址时视其为 payload。
fn typed_data_param(params: &[Value]) -> Option<&Value> {
    let first = params.first()?;
    let first_is_address = first
        .as_str()
        .is_some_and(|text| Address::from_str(text).is_ok());
    if first_is_address {
        params.get(1)
    } else {
        Some(first)
    }
}

fn parse_typed_data(raw: &Value) -> Result<TypedData, serde_json::Error> {
    match raw {
        Value::String(text) => serde_json::from_str(text),
        other => serde_json::from_value(other.clone()),
    }
}
