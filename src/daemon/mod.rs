//! Daemon subsystem: per-widget refresh orchestration, the shared widget
//! cache, store maintenance, and signal handling.

pub mod cache;
#[cfg(feature = "sqlite")]
pub mod maintenance;
pub mod orchestrator;
#[cfg(feature = "daemon")]
pub mod signals;
