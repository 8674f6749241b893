use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_counter_vec, CounterVec, IntCounterVec};

lazy_static! {
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "floodgate_decisions_total",
        "Total number of rate limit decisions",
        &["allowed"]
    )
    .unwrap();

    pub static ref STORE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "floodgate_store_errors_total",
        "Total number of store failures surfaced to callers",
        &["kind"]
    )
    .unwrap();

    pub static ref SCRIPT_EXECUTIONS_TOTAL: CounterVec = register_counter_vec!(
        "floodgate_script_executions_total",
        "Total number of Lua script executions",
        &["script", "result"]
    )
    .unwrap();

    pub static ref REAPER_REMOVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "floodgate_reaper_removed_total",
        "Entries removed by the in-memory store reaper",
        &["kind"]
    )
    .unwrap();
}

/// Record a rate limit decision
pub fn record_decision(allowed: bool) {
    let allowed_str = if allowed { "true" } else { "false" };
    DECISIONS_TOTAL.with_label_values(&[allowed_str]).inc();
}

/// Record a store failure by error kind
pub fn record_store_error(kind: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a script execution
pub fn record_script_execution(script: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    SCRIPT_EXECUTIONS_TOTAL
        .with_label_values(&[script, result])
        .inc();
}

/// Record entries removed by the reaper
pub fn record_reaper_removed(kind: &str, count: u64) {
    if count > 0 {
        REAPER_REMOVED_TOTAL.with_label_values(&[kind]).inc_by(count);
    }
}
