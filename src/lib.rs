#![forbid(unsafe_code)]

//! deckhand (dkh) — terminal dashboard daemon that runs widget scripts and
//! turns their stdout into live panels.
//!
//! Pipeline per refresh tick:
//! 1. **Trust gate** — tiered path resolution, checksum verification,
//!    traversal/symlink-escape rejection
//! 2. **Executor** — direct spawn, scrubbed environment, capped capture,
//!    process-tree kill on timeout
//! 3. **Protocol parser** — bounded widget model from untrusted stdout,
//!    with synchronous history queries against the metrics store
//! 4. **Layout engine** — breakpoint grid with persisted resize/reorder
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use deckhand::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use deckhand::core::config::Config;
//! use deckhand::protocol::parser::ProtocolParser;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod exec;
pub mod layout;
pub mod logger;
pub mod protocol;
pub mod store;
pub mod trust;
