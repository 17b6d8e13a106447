use std::sync::Arc;

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result, bail};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::{APPROVAL_FAILED, SAFE_ADDRESS_REQUIRED, WALLET_ADDRESS_FAILED};
use crate::approval::{ApprovalOutcome, PendingSelection};
use crate::context::AgentContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    #[serde(default)]
    safe_address: Option<Value>,
    #[serde(default)]
    safe_tx_hash: Option<Value>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub(super) async fn sign_pending(
    State(context): State<Arc<AgentContext>>,
    body: Bytes,
) -> Response {
    let request: SignRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(target: "server", error = %err, "请求体不是合法 JSON");
            return error_response(StatusCode::BAD_REQUEST, SAFE_ADDRESS_REQUIRED);
        }
    };

    let Some(raw_address) = request
        .safe_address
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, SAFE_ADDRESS_REQUIRED);
    };

    match approve(&context, raw_address, request.safe_tx_hash.as_ref()).await {
        Ok(outcome) => {
            info!(
                target: "server",
                safe = %outcome.safe,
                safe_tx_hash = %outcome.safe_tx_hash,
                execution_tx = %outcome.execution_tx,
                "审批请求完成"
            );
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(err) => {
            error!(target: "server", safe = raw_address, error = ?err, "审批请求失败");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, APPROVAL_FAILED)
        }
    }
}

async fn approve(
    context: &AgentContext,
    raw_address: &str,
    raw_hash: Option<&Value>,
) -> Result<ApprovalOutcome> {
    let safe: Address = raw_address
        .parse()
        .with_context(|| format!("invalid Safe address {raw_address:?}"))?;
    let selection = match raw_hash {
        None | Some(Value::Null) => PendingSelection::First,
        Some(Value::String(hash)) if hash.trim().is_empty() => PendingSelection::First,
        Some(Value::String(hash)) => PendingSelection::ByHash(
            hash.trim()
                .parse::<B256>()
                .with_context(|| format!("invalid safeTxHash {hash:?}"))?,
        ),
        Some(other) => bail!("safeTxHash must be a string, got {other}"),
    };
    Ok(context.approve(safe, selection).await?)
}

pub(super) async fn agent_address(State(context): State<Arc<AgentContext>>) -> Response {
    match context.agent_address().await {
        Ok(address) => (
            StatusCode::OK,
            Json(json!({ "message": format!("Wallet address: {address}") })),
        )
            .into_response(),
        Err(err) => {
            error!(target: "server", error = %err, "读取钱包地址失败");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, WALLET_ADDRESS_FAILED)
        }
    }
}
