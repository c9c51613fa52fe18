//! The parsed widget model: rows, row elements, actions.
//!
//! `RowElement` is a closed sum type; rendering and tests switch
//! exhaustively over it, and every variant carries everything needed to
//! render without re-parsing (history variants hold their resolved samples).

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::store::SeriesKey;
use crate::store::query::{Aggregation, TimeRange};

/// Rendered in place of history values the store has no data for.
pub const PLACEHOLDER: &str = "--";

// ──────────────────── element leaves ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Ok,
    Warn,
    Error,
    Info,
}

impl StatusState {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ok" => Some(Self::Ok),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "info" => Some(Self::Info),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStyle {
    #[default]
    Inline,
    Chart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStyle {
    #[default]
    Braille,
    Bars,
    Points,
}

impl LineStyle {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "braille" => Some(Self::Braille),
            "bars" => Some(Self::Bars),
            "points" => Some(Self::Points),
            _ => None,
        }
    }
}

/// Fixed y-axis bounds parsed from `min-max` (e.g. `0-100`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (min, max) = raw.split_once('-')?;
        let min: f64 = min.trim().parse().ok()?;
        let max: f64 = max.trim().parse().ok()?;
        (min < max).then_some(Self { min, max })
    }
}

// ──────────────────── row elements ────────────────────

/// One inline visualization inside a row. Self-contained by design.
#[derive(Debug, Clone, PartialEq)]
pub enum RowElement {
    Status {
        state: StatusState,
    },
    Progress {
        /// Already clamped to 0..=100.
        value: u8,
        gradient: Option<String>,
        style: ProgressStyle,
    },
    Sparkline {
        values: Vec<f64>,
        gradient: Option<String>,
        width: Option<u16>,
    },
    MiniProgress {
        value: u8,
        width: Option<u16>,
        gradient: Option<String>,
    },
    TableHeader {
        cells: Vec<String>,
    },
    TableRow {
        cells: Vec<String>,
    },
    Divider {
        glyph: char,
        color: Option<String>,
    },
    Graph {
        values: Vec<f64>,
        gradient: Option<String>,
        label: Option<String>,
        scale: Option<Scale>,
        width: Option<u16>,
    },
    Line {
        values: Vec<f64>,
        gradient: Option<String>,
        label: Option<String>,
        scale: Option<Scale>,
        width: Option<u16>,
        height: Option<u16>,
        style: LineStyle,
    },
    Datafetch {
        series: SeriesKey,
        aggregation: Aggregation,
        range: TimeRange,
        /// Filled from the store during parsing; `None` renders [`PLACEHOLDER`].
        resolved: Option<f64>,
    },
    HistoryGraph {
        series: SeriesKey,
        range: TimeRange,
        gradient: Option<String>,
        label: Option<String>,
        scale: Option<Scale>,
        width: Option<u16>,
        /// Filled from the store during parsing; empty renders [`PLACEHOLDER`].
        values: Vec<f64>,
    },
    HistorySparkline {
        series: SeriesKey,
        range: TimeRange,
        gradient: Option<String>,
        width: Option<u16>,
        values: Vec<f64>,
    },
    HistoryLine {
        series: SeriesKey,
        range: TimeRange,
        gradient: Option<String>,
        width: Option<u16>,
        height: Option<u16>,
        style: LineStyle,
        values: Vec<f64>,
    },
}

/// One dashboard row: leftover markup text plus its extracted elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetRow {
    pub text: String,
    pub elements: Vec<RowElement>,
}

impl WidgetRow {
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            elements: Vec::new(),
        }
    }
}

// ──────────────────── actions ────────────────────

/// A declarative action. Flags are preserved verbatim for the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetAction {
    pub label: String,
    pub command: String,
    pub danger: bool,
    pub sudo: bool,
    pub refresh: bool,
    pub timeout_seconds: Option<u64>,
}

// ──────────────────── failure model ────────────────────

/// Where in the refresh pipeline a widget failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Security,
    Execution,
    Protocol,
    Storage,
}

impl FailureCategory {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Execution => "execution",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
        }
    }
}

/// Failure details attached to a synthesized error snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetFailure {
    pub category: FailureCategory,
    pub message: String,
}

// ──────────────────── widget data ────────────────────

/// The parsed, renderable snapshot for one widget refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetData {
    pub title: Option<String>,
    /// Protocol override of the configured refresh interval (seconds).
    pub refresh_override: Option<u64>,
    pub rows: Vec<WidgetRow>,
    pub actions: Vec<WidgetAction>,
    pub failure: Option<WidgetFailure>,
    /// Row-local parse warnings. Never fatal.
    pub warnings: Vec<String>,
    /// Rows dropped past the cap (a marker row is appended when nonzero).
    pub dropped_rows: usize,
    pub timestamp: DateTime<Utc>,
}

impl WidgetData {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            title: None,
            refresh_override: None,
            rows: Vec::new(),
            actions: Vec::new(),
            failure: None,
            warnings: Vec::new(),
            dropped_rows: 0,
            timestamp: Utc::now(),
        }
    }

    /// Synthesize an error snapshot (used by the orchestrator when
    /// validation or execution fails).
    #[must_use]
    pub fn failed(category: FailureCategory, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut data = Self::empty();
        data.rows = vec![WidgetRow {
            text: message.clone(),
            elements: vec![RowElement::Status {
                state: StatusState::Error,
            }],
        }];
        data.failure = Some(WidgetFailure { category, message });
        data
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keywords_are_case_insensitive() {
        assert_eq!(StatusState::parse("OK"), Some(StatusState::Ok));
        assert_eq!(StatusState::parse("warning"), Some(StatusState::Warn));
        assert_eq!(StatusState::parse("nope"), None);
    }

    #[test]
    fn scale_requires_ordered_bounds() {
        assert_eq!(Scale::parse("0-100"), Some(Scale { min: 0.0, max: 100.0 }));
        assert_eq!(Scale::parse("100-0"), None);
        assert_eq!(Scale::parse("5"), None);
    }

    #[test]
    fn failed_snapshot_carries_category_and_error_row() {
        let data = WidgetData::failed(FailureCategory::Security, "tampered");
        assert!(data.is_error());
        assert_eq!(data.failure.as_ref().unwrap().category.label(), "security");
        assert_eq!(data.rows.len(), 1);
        assert!(matches!(
            data.rows[0].elements[0],
            RowElement::Status {
                state: StatusState::Error
            }
        ));
    }
}
