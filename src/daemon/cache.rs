//! Shared widget-data cache: the single mutable structure between refresh
//! tasks and the render layer.
//!
//! One entry per widget id. Discipline is single-writer/multi-reader per
//! key: only a widget's own refresh task writes its entry, so refresh N's
//! write happens-before refresh N+1's overwrite. The cache is an explicit
//! injectable handle, not a singleton; tests construct isolated instances.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::protocol::element::WidgetData;

/// Cached state for one widget.
#[derive(Debug, Clone)]
pub struct WidgetState {
    /// Latest snapshot (success or synthesized error).
    pub data: WidgetData,
    /// Monotonically increasing failure streak; reset on success.
    pub consecutive_errors: u32,
    /// When the last successful refresh completed.
    pub last_success: Option<DateTime<Utc>>,
    /// A refresh is currently in flight (render layers may overlay this).
    pub refreshing: bool,
    /// The expanded view is active; refreshes pass `--extended`.
    pub extended: bool,
}

/// Cloneable handle to the cache.
#[derive(Clone, Default)]
pub struct WidgetCache {
    inner: Arc<RwLock<HashMap<String, WidgetState>>>,
}

impl WidgetCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful refresh: snapshot replaced, error streak cleared.
    pub fn store_success(&self, id: &str, data: WidgetData) {
        let mut map = self.inner.write();
        let timestamp = data.timestamp;
        let entry = map.entry(id.to_string()).or_insert_with(|| WidgetState {
            data: WidgetData::empty(),
            consecutive_errors: 0,
            last_success: None,
            refreshing: false,
            extended: false,
        });
        entry.data = data;
        entry.consecutive_errors = 0;
        entry.last_success = Some(timestamp);
        entry.refreshing = false;
    }

    /// Record a failed refresh: snapshot replaced, streak incremented,
    /// `last_success` preserved so consumers can show staleness.
    pub fn store_failure(&self, id: &str, data: WidgetData) {
        let mut map = self.inner.write();
        let entry = map.entry(id.to_string()).or_insert_with(|| WidgetState {
            data: WidgetData::empty(),
            consecutive_errors: 0,
            last_success: None,
            refreshing: false,
            extended: false,
        });
        entry.data = data;
        entry.consecutive_errors = entry.consecutive_errors.saturating_add(1);
        entry.refreshing = false;
    }

    pub fn set_refreshing(&self, id: &str, refreshing: bool) {
        let mut map = self.inner.write();
        let entry = map.entry(id.to_string()).or_insert_with(|| WidgetState {
            data: WidgetData::empty(),
            consecutive_errors: 0,
            last_success: None,
            refreshing: false,
            extended: false,
        });
        entry.refreshing = refreshing;
    }

    /// Toggle the expanded view for a widget. Returns the new state.
    pub fn toggle_extended(&self, id: &str) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(id) {
            Some(entry) => {
                entry.extended = !entry.extended;
                entry.extended
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_extended(&self, id: &str) -> bool {
        self.inner.read().get(id).is_some_and(|e| e.extended)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<WidgetState> {
        self.inner.read().get(id).cloned()
    }

    /// Stable snapshot of every entry, sorted by widget id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, WidgetState)> {
        let map = self.inner.read();
        let mut entries: Vec<(String, WidgetState)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Drop a widget's entry (config reload removed it).
    pub fn remove(&self, id: &str) {
        self.inner.write().remove(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
