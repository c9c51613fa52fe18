//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use deckhand::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, SecurityConfig, WidgetConfig, WidgetLocation};
pub use crate::core::errors::{DeckhandError, Result};

// Trust
pub use crate::trust::checksum::BundledChecksums;
pub use crate::trust::validator::{
    ScriptValidator, TrustFailure, ValidationResult, ValidationStatus,
};

// Execution
pub use crate::exec::runner::{ExecutionResult, ExecutionStatus, ScriptExecutor};

// Store
pub use crate::store::query::{Aggregation, TimeRange};
pub use crate::store::{DataPoint, HistoryStore, NullHistoryStore, SeriesKey};
#[cfg(feature = "sqlite")]
pub use crate::store::sqlite::{MetricsStore, SharedMetricsStore};

// Protocol
pub use crate::protocol::element::{RowElement, WidgetData, WidgetRow};
pub use crate::protocol::parser::ProtocolParser;

// Layout
pub use crate::layout::grid::{LayoutEngine, LayoutPlacement, LayoutPlan};

// Daemon
pub use crate::daemon::cache::{WidgetCache, WidgetState};
pub use crate::daemon::orchestrator::RefreshOrchestrator;
