//! Embedded time-series store: tag/measurement/field model, widget-isolated,
//! written by the `datastore:` directive and read back by history directives.

#![allow(missing_docs)]

pub mod line_protocol;
pub mod query;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::core::errors::Result;
use crate::store::query::{Aggregation, TimeRange};

/// One field value. Numeric fields feed aggregations; text/json fields are
/// stored verbatim and ignored by numeric queries.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

/// A parsed data point, pre-canonicalization of tags already applied
/// (sorted by key, duplicates collapsed to the last occurrence).
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    /// Unix seconds. `None` means "now", stamped at write time.
    pub timestamp: Option<i64>,
    pub fields: Vec<(String, FieldValue)>,
}

impl DataPoint {
    /// Canonical tag string used as part of the natural key: `k=v,k2=v2`.
    #[must_use]
    pub fn canonical_tags(&self) -> String {
        let parts: Vec<String> = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        parts.join(",")
    }
}

/// A `measurement.field` reference with an optional tag filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesKey {
    pub measurement: String,
    pub field: String,
    /// Points must carry every listed pair to match. Empty = match all.
    pub tag_filter: Vec<(String, String)>,
}

impl SeriesKey {
    /// Parse `measurement.field` (the grammar used by history directives).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (measurement, field) = raw.split_once('.')?;
        if measurement.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some(Self {
            measurement: measurement.to_string(),
            field: field.to_string(),
            tag_filter: Vec::new(),
        })
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.measurement, self.field)
    }
}

/// Seam between the protocol parser and the storage backend. History
/// directives resolve through this trait synchronously during parsing; a
/// backend with no matching data answers `None`/empty, never an error the
/// parser would have to surface as a crash.
pub trait HistoryStore: Send + Sync {
    /// Upsert one point under the widget's isolation key.
    fn write_point(&self, widget_id: &str, point: &DataPoint) -> Result<()>;

    /// Most recent numeric value for the series.
    fn latest(&self, widget_id: &str, key: &SeriesKey) -> Result<Option<f64>>;

    /// Aggregate numeric values within the range.
    fn aggregate(
        &self,
        widget_id: &str,
        key: &SeriesKey,
        op: Aggregation,
        range: &TimeRange,
    ) -> Result<Option<f64>>;

    /// Ordered `(timestamp, value)` samples within the range, ascending.
    fn series(&self, widget_id: &str, key: &SeriesKey, range: &TimeRange)
    -> Result<Vec<(i64, f64)>>;
}

/// Backend used when no store is available: drops writes, answers empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    fn write_point(&self, _widget_id: &str, _point: &DataPoint) -> Result<()> {
        Ok(())
    }

    fn latest(&self, _widget_id: &str, _key: &SeriesKey) -> Result<Option<f64>> {
        Ok(None)
    }

    fn aggregate(
        &self,
        _widget_id: &str,
        _key: &SeriesKey,
        _op: Aggregation,
        _range: &TimeRange,
    ) -> Result<Option<f64>> {
        Ok(None)
    }

    fn series(
        &self,
        _widget_id: &str,
        _key: &SeriesKey,
        _range: &TimeRange,
    ) -> Result<Vec<(i64, f64)>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_key_parses_measurement_and_field() {
        let key = SeriesKey::parse("cpu.usage").unwrap();
        assert_eq!(key.measurement, "cpu");
        assert_eq!(key.field, "usage");
        assert_eq!(key.to_string(), "cpu.usage");
    }

    #[test]
    fn series_key_rejects_malformed_references() {
        assert!(SeriesKey::parse("cpu").is_none());
        assert!(SeriesKey::parse(".usage").is_none());
        assert!(SeriesKey::parse("cpu.").is_none());
        assert!(SeriesKey::parse("cpu.usage.extra").is_none());
    }

    #[test]
    fn canonical_tags_render_in_order() {
        let point = DataPoint {
            measurement: "net".to_string(),
            tags: vec![
                ("host".to_string(), "alpha".to_string()),
                ("iface".to_string(), "eth0".to_string()),
            ],
            timestamp: None,
            fields: vec![("rx".to_string(), FieldValue::Number(1.0))],
        };
        assert_eq!(point.canonical_tags(), "host=alpha,iface=eth0");
    }

    #[test]
    fn null_store_answers_empty() {
        let store = NullHistoryStore;
        let key = SeriesKey::parse("cpu.usage").unwrap();
        assert_eq!(store.latest("w", &key).unwrap(), None);
        assert!(store.series("w", &key, &TimeRange::Samples(5)).unwrap().is_empty());
    }
}
