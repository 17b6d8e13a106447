use std::time::Duration;

use alloy_primitives::Address;
use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use tracing::{info, warn};

use super::metrics::prometheus_enabled;
use crate::approval::{ApprovalError, ApprovalOutcome};

const TRANSPORT_REQUESTS: &str = "safe_agent_transport_requests_total";
const APPROVALS: &str = "safe_agent_approvals_total";
const APPROVAL_DURATION: &str = "safe_agent_approval_duration_ms";
const SAFE_PROVISIONED: &str = "safe_agent_safe_provisioned_total";

pub(super) fn describe_metrics() {
    describe_counter!(
        TRANSPORT_REQUESTS,
        "Wallet transport requests by wire method and result"
    );
    describe_counter!(APPROVALS, "Approval runs by outcome");
    describe_histogram!(
        APPROVAL_DURATION,
        Unit::Milliseconds,
        "Time from approval start to execTransaction submission"
    );
    describe_counter!(SAFE_PROVISIONED, "Safe provisioning runs by outcome");
}

pub fn transport_request(method: &str, result: &'static str) {
    if prometheus_enabled() {
        counter!(
            TRANSPORT_REQUESTS,
            "method" => method.to_string(),
            "result" => result
        )
        .increment(1);
    }
}

pub fn approval_started(safe: Address) {
    info!(
        target: "monitoring::approval",
        event = "start",
        safe = %safe,
        "开始审批待执行交易"
    );
}

pub fn approval_completed(outcome: &ApprovalOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
    info!(
        target: "monitoring::approval",
        event = "completed",
        safe = %outcome.safe,
        safe_tx_hash = %outcome.safe_tx_hash,
        execution_tx = %outcome.execution_tx,
        elapsed_ms = elapsed.as_millis() as u64,
        "审批完成并已提交执行"
    );

    if prometheus_enabled() {
        counter!(APPROVALS, "result" => "success").increment(1);
        histogram!(APPROVAL_DURATION).record(elapsed_ms);
    }
}

pub fn approval_failed(safe: Address, err: &ApprovalError) {
    let reason = match err {
        ApprovalError::NoPendingTransaction(_) => "no_pending",
        ApprovalError::TransactionNotFound { .. } => "not_found",
        ApprovalError::Safe(_) => "safe",
        ApprovalError::Coordination(_) => "coordination",
    };
    warn!(
        target: "monitoring::approval",
        event = "failed",
        safe = %safe,
        reason,
        error = %err,
        "审批失败"
    );

    if prometheus_enabled() {
        counter!(APPROVALS, "result" => reason).increment(1);
    }
}

pub fn safe_provisioned(safe: Address, result: &'static str) {
    info!(
        target: "monitoring::provision",
        event = "provision",
        safe = %safe,
        result,
        "Safe 部署流程结束"
    );

    if prometheus_enabled() {
        counter!(SAFE_PROVISIONED, "result" => result).increment(1);
    }
}
