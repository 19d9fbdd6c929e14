// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const SIGN_IN: &str = "auth.sign_in";
pub const SIGN_OUT: &str = "auth.sign_out";
pub const SIGN_IN_LOCKOUT: &str = "auth.sign_in.lockout";
pub const RECORD_SIGN_IN_FAILED: &str = "auth.record_sign_in.failed";
pub const GATE_DECISION: &str = "gate.decision";
