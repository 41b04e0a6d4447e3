//! Flow metrics
//!
//! - `oauth_flow_operations_total` (counter): labels `operation`, `outcome`
//!
//! `outcome` is `ok` or the error label of the failure.

use crate::error::Result;

pub const OPERATIONS_TOTAL: &str = "oauth_flow_operations_total";

/// Record the outcome of one client operation.
pub fn record_operation(operation: &'static str, outcome: &'static str) {
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Record `result` under `operation` and pass it through.
pub(crate) fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    record_operation(operation, outcome);
    result
}
