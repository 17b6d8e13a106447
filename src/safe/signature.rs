use alloy_primitives::{Address, Bytes};

use super::SafeError;
use crate::api::Confirmation;

const ECDSA_SIGNATURE_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSignature {
    pub signer: Address,
    pub data: Bytes,
}

impl SafeSignature {
    /// 接受 `v ∈ {0, 1}` 或 `{27, 28}` 的 ECDSA 签名，统一为 27/28。
    pub fn from_ecdsa(signer: Address, raw: &[u8]) -> Result<Self, SafeError> {
        if raw.len() != ECDSA_SIGNATURE_LEN {
            return Err(SafeError::InvalidSignature {
                owner: signer,
                reason: format!("expected {ECDSA_SIGNATURE_LEN} bytes, got {}", raw.len()),
            });
        }

        let mut data = raw.to_vec();
        let v = data[ECDSA_SIGNATURE_LEN - 1];
        data[ECDSA_SIGNATURE_LEN - 1] = match v {
            0 | 1 => v + 27,
            27 | 28 => v,
            other => {
                return Err(SafeError::InvalidSignature {
                    owner: signer,
                    reason: format!("unexpected recovery id {other}"),
                });
            }
        };

        Ok(Self {
            signer,
            data: Bytes::from(data),
        })
    }

    pub fn from_confirmation(confirmation: &Confirmation) -> Result<Self, SafeError> {
        let signature = confirmation.signature.as_ref().ok_or_else(|| {
            SafeError::InvalidSignature {
                owner: confirmation.owner,
                reason: "confirmation carries no signature".to_string(),
            }
        })?;
        // 仅支持 65 字节静态签名；合约签名带动态段，这里直接拒绝
        if signature.len() != ECDSA_SIGNATURE_LEN {
            return Err(SafeError::InvalidSignature {
                owner: confirmation.owner,
                reason: format!("unsupported signature length {}", signature.len()),
            });
        }
        Ok(Self {
            signer: confirmation.owner,
            data: signature.clone(),
        })
    }
}

/// Safe 要求签名按所有者地址升序拼接；同一所有者只保留首个签名。
pub fn pack_signatures(mut signatures: Vec<SafeSignature>) -> Bytes {
    signatures.sort_by_key(|signature| signature.signer);
    signatures.dedup_by_key(|signature| signature.signer);

    let mut packed = Vec::with_capacity(signatures.len() * ECDSA_SIGNATURE_LEN);
    for signature in &signatures {
        packed.extend_from_slice(&signature.data);
    }
    Bytes::from(packed)
}
