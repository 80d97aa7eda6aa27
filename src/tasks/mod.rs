//! Background loops spawned by `main`

pub mod audit_flush;
pub mod sweep;
