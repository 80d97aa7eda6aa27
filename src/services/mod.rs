//! Triage and process-scoped helper services

pub mod magic_link;
pub mod openai;
pub mod presence;
pub mod triage;
