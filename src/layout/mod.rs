//! Responsive grid layout: breakpoint-driven column counts, pinned strip,
//! priority-based drops, resize debouncing, and persisted resize/reorder
//! operations.

pub mod debounce;
pub mod grid;
pub mod ops;
