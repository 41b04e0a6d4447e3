//! Store metrics
//!
//! Counters are emitted through the `metrics` facade. Nothing is recorded
//! unless the embedding application installs a recorder.

use crate::table::TableKind;

pub const EVICTIONS_TOTAL: &str = "credential_store_evictions_total";
pub const SWEEP_ERRORS_TOTAL: &str = "credential_store_sweep_errors_total";

/// Count one expired entry removed, by sweep or on read.
pub fn record_eviction(table: TableKind) {
    metrics::counter!(EVICTIONS_TOTAL, "table" => table.name()).increment(1);
}

/// Count one storage error swallowed by the sweep.
pub fn record_sweep_error(table: TableKind) {
    metrics::counter!(SWEEP_ERRORS_TOTAL, "table" => table.name()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_eviction(TableKind::Session);
        record_sweep_error(TableKind::Session);
    }

    #[test]
    fn counters_carry_table_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_eviction(TableKind::PendingFlow);
        record_eviction(TableKind::PendingFlow);
        record_sweep_error(TableKind::HandleCache);

        let output = handle.render();
        assert!(
            output.contains("credential_store_evictions_total{table=\"pending-flow\"} 2"),
            "got: {output}"
        );
        assert!(
            output.contains("credential_store_sweep_errors_total{table=\"handle-cache\"} 1"),
            "got: {output}"
        );
    }
}
