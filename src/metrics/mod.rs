//! Metrics module
//!
//! Prometheus counters for gate decisions, token verifications and errors.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

lazy_static! {
    pub static ref GATE_DECISIONS: CounterVec = register_counter_vec!(
        "sso_gate_decisions_total",
        "Gate decisions by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref TOKEN_VERIFICATIONS: CounterVec = register_counter_vec!(
        "sso_gate_token_verifications_total",
        "Token verifications by result",
        &["result"]  // "valid", "expired", "invalid_signature", "malformed"
    ).unwrap();

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "sso_gate_errors_total",
        "Errors at the request boundary",
        &["type"]
    ).unwrap();
}

/// Record a gate decision
pub fn record_decision(outcome: &str) {
    GATE_DECISIONS.with_label_values(&[outcome]).inc();
}

/// Record a token verification result
pub fn record_token_verification(result: &str) {
    TOKEN_VERIFICATIONS.with_label_values(&[result]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Encode the default registry in the Prometheus text format
pub fn gather_text() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
