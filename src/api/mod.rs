use std::time::{Duration, Instant};

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CoordinationConfig;

pub mod serde_helpers;
pub mod types;

pub use types::{Confirmation, ConfirmationRequest, Page, PendingTransaction, SafeInfo};

/// 单次列举最多跟随的分页数。
const MAX_PENDING_PAGES: usize = 20;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("failed to call Safe transaction service: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API request to {endpoint} failed with status {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response schema from {endpoint}: {message}")]
    Schema { endpoint: String, message: String },
}

/// 多签签名协调服务：列出待执行交易、提交所有者确认签名。
#[async_trait]
pub trait CoordinationService: Send + Sync {
    async fn pending_transactions(
        &self,
        safe: Address,
    ) -> Result<Vec<PendingTransaction>, CoordinationError>;

    async fn confirm_transaction(
        &self,
        safe_tx_hash: B256,
        signature: &Bytes,
    ) -> Result<(), CoordinationError>;
}

#[derive(Clone, Debug)]
pub struct SafeTransactionServiceClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
    api_key: Option<String>,
}

impl SafeTransactionServiceClient {
    pub fn new(client: reqwest::Client, config: &CoordinationConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            client,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
        }
    }

    pub async fn safe_info(&self, safe: Address) -> Result<SafeInfo, CoordinationError> {
        let url = self.endpoint(&format!("/v1/safes/{safe}/"));
        let request = self.authorize(self.client.get(&url));
        self.send_json(url, request).await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.request_timeout);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send_json<T>(&self, url: String, request: RequestBuilder) -> Result<T, CoordinationError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = check_status(&url, request.send().await?).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| CoordinationError::Schema {
            endpoint: url,
            message: err.to_string(),
        })
    }
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CoordinationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CoordinationError::ApiStatus {
        endpoint: url.to_string(),
        status,
        body,
    })
}

#[async_trait]
impl CoordinationService for SafeTransactionServiceClient {
    async fn pending_transactions(
        &self,
        safe: Address,
    ) -> Result<Vec<PendingTransaction>, CoordinationError> {
        let start = Instant::now();
        let info = self.safe_info(safe).await?;

        let url = self.endpoint(&format!("/v1/safes/{safe}/multisig-transactions/"));
        let nonce = info.nonce.to_string();
        let request = self.authorize(self.client.get(&url)).query(&[
            ("executed", "false"),
            ("nonce__gte", nonce.as_str()),
            ("ordering", "nonce"),
        ]);
        let mut page: Page<PendingTransaction> = self.send_json(url, request).await?;
        let total = page.count;
        let mut pending = std::mem::take(&mut page.results);

        let mut pages = 1;
        while let Some(next) = page.next.take() {
            if pages >= MAX_PENDING_PAGES {
                warn!(
                    target: "api::safe_tx",
                    safe = %safe,
                    pages,
                    fetched = pending.len(),
                    "待执行交易分页过多，停止继续翻页"
                );
                break;
            }
            let request = self.authorize(self.client.get(&next));
            page = self.send_json(next, request).await?;
            pending.append(&mut page.results);
            pages += 1;
        }

        let elapsed_ms = start.elapsed().as_micros() as f64 / 1_000.0;
        info!(
            target: "api::safe_tx",
            safe = %safe,
            safe_nonce = info.nonce,
            threshold = info.threshold,
            pending = pending.len(),
            total = ?total,
            pages,
            elapsed_ms,
            "已获取待执行多签交易"
        );
        Ok(pending)
    }

    async fn confirm_transaction(
        &self,
        safe_tx_hash: B256,
        signature: &Bytes,
    ) -> Result<(), CoordinationError> {
        let url = self.endpoint(&format!("/v1/multisig-transactions/{safe_tx_hash}/confirmations/"));
        let body = ConfirmationRequest {
            signature: signature.clone(),
        };
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        check_status(&url, response).await?;

        debug!(target: "api::safe_tx", %safe_tx_hash, "确认签名已提交");
        Ok(())
    }
}
