//! Line-oriented stdout parser: prefix directives, inline elements, bounded
//! output, synchronous history resolution against the store.
//!
//! Unrecognized lines are ignored rather than rejected, so scripts written
//! for newer protocol revisions degrade instead of erroring.

use crate::protocol::directives::DirectiveSet;
use crate::protocol::element::{RowElement, WidgetAction, WidgetData, WidgetRow};
use crate::store::line_protocol;
use crate::store::HistoryStore;

/// Maximum rows retained per widget. A runaway script cannot grow the
/// renderable model past this; excess rows become a single marker row.
pub const ROW_CAP: usize = 50;

/// Floor for a protocol-supplied refresh override.
const MIN_REFRESH_SECONDS: u64 = 1;

/// Converts raw widget stdout into a [`WidgetData`] snapshot.
pub struct ProtocolParser {
    directives: DirectiveSet,
    row_cap: usize,
}

impl ProtocolParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            directives: DirectiveSet::new(),
            row_cap: ROW_CAP,
        }
    }

    /// Row cap override for tests.
    #[must_use]
    pub fn with_row_cap(row_cap: usize) -> Self {
        Self {
            directives: DirectiveSet::new(),
            row_cap,
        }
    }

    /// Parse one refresh's stdout. `store` serves history directives and
    /// receives `datastore:` writes; storage failures degrade the affected
    /// element and never abort the parse.
    #[must_use]
    pub fn parse(&self, widget_id: &str, raw: &str, store: &dyn HistoryStore) -> WidgetData {
        let mut data = WidgetData::empty();

        for raw_line in raw.lines() {
            let line = raw_line.trim_end_matches('\r');

            if let Some(body) = strip_keyword(line, "title:") {
                data.title = Some(body.trim().to_string());
            } else if let Some(body) = strip_keyword(line, "refresh:") {
                match body.trim().parse::<u64>() {
                    Ok(seconds) => {
                        data.refresh_override = Some(seconds.max(MIN_REFRESH_SECONDS));
                    }
                    Err(_) => data
                        .warnings
                        .push(format!("refresh: not a number: {:?}", body.trim())),
                }
            } else if let Some(body) = strip_keyword(line, "row:") {
                let row = self.parse_row_body(widget_id, body, store, &mut data.warnings);
                push_row(&mut data, row, self.row_cap);
            } else if let Some(body) = strip_keyword(line, "action:") {
                match parse_action(body) {
                    Ok((action, mut action_warnings)) => {
                        data.actions.push(action);
                        data.warnings.append(&mut action_warnings);
                    }
                    Err(warning) => data.warnings.push(warning),
                }
            } else if let Some(body) = strip_keyword(line, "datastore:") {
                match line_protocol::parse_line(body) {
                    Ok(point) => {
                        if let Err(error) = store.write_point(widget_id, &point) {
                            data.warnings.push(format!("datastore write failed: {error}"));
                        }
                    }
                    Err(warning) => data.warnings.push(warning),
                }
            } else if let Some(element) = self.directives.parse_table_line(line) {
                push_row(
                    &mut data,
                    WidgetRow {
                        text: String::new(),
                        elements: vec![element],
                    },
                    self.row_cap,
                );
            }
            // Anything else: ignored, forward-compatible.
        }

        if data.dropped_rows > 0 {
            data.rows.push(WidgetRow::text_only(format!(
                "({} more rows)",
                data.dropped_rows
            )));
        }

        data
    }

    fn parse_row_body(
        &self,
        widget_id: &str,
        body: &str,
        store: &dyn HistoryStore,
        warnings: &mut Vec<String>,
    ) -> WidgetRow {
        let (text, mut elements, mut row_warnings) = self.directives.parse_row(body);
        warnings.append(&mut row_warnings);

        for element in &mut elements {
            resolve_history(widget_id, element, store, warnings);
        }

        WidgetRow { text, elements }
    }
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── history resolution ────────────────────

/// Fill a history-backed element from the store. Missing data leaves the
/// well-defined empty/`None` placeholder state; store errors additionally
/// record a warning.
fn resolve_history(
    widget_id: &str,
    element: &mut RowElement,
    store: &dyn HistoryStore,
    warnings: &mut Vec<String>,
) {
    match element {
        RowElement::Datafetch {
            series,
            aggregation,
            range,
            resolved,
        } => match store.aggregate(widget_id, series, *aggregation, range) {
            Ok(value) => *resolved = value,
            Err(error) => {
                warnings.push(format!("datafetch {series}: {error}"));
            }
        },
        RowElement::HistoryGraph {
            series,
            range,
            values,
            ..
        }
        | RowElement::HistorySparkline {
            series,
            range,
            values,
            ..
        }
        | RowElement::HistoryLine {
            series,
            range,
            values,
            ..
        } => match store.series(widget_id, series, range) {
            Ok(samples) => *values = samples.into_iter().map(|(_, value)| value).collect(),
            Err(error) => {
                warnings.push(format!("history {series}: {error}"));
            }
        },
        _ => {}
    }
}

// ──────────────────── line helpers ────────────────────

/// Case-insensitive keyword prefix match. `get` keeps a multi-byte char at
/// the boundary from panicking the slice.
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = line.trim_start();
    let head = trimmed.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(&trimmed[keyword.len()..])
    } else {
        None
    }
}

fn push_row(data: &mut WidgetData, row: WidgetRow, cap: usize) {
    if data.rows.len() < cap {
        data.rows.push(row);
    } else {
        data.dropped_rows += 1;
    }
}

/// Canonical action grammar: `[flag,flag] Label:command`, flags optional.
/// Flags: `danger`, `sudo`, `refresh`, `timeout=N`.
fn parse_action(body: &str) -> Result<(WidgetAction, Vec<String>), String> {
    let body = body.trim();
    let mut warnings = Vec::new();

    let (flags_raw, rest) = if let Some(after) = body.strip_prefix('[') {
        let end = after
            .find(']')
            .ok_or_else(|| format!("action: unterminated flag list in {body:?}"))?;
        (Some(&after[..end]), after[end + 1..].trim_start())
    } else {
        (None, body)
    };

    let (label, command) = rest
        .split_once(':')
        .ok_or_else(|| format!("action: expected Label:command in {body:?}"))?;
    let label = label.trim();
    let command = command.trim();
    if label.is_empty() || command.is_empty() {
        return Err(format!("action: empty label or command in {body:?}"));
    }

    let mut action = WidgetAction {
        label: label.to_string(),
        command: command.to_string(),
        danger: false,
        sudo: false,
        refresh: false,
        timeout_seconds: None,
    };

    if let Some(flags_raw) = flags_raw {
        for flag in flags_raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match flag.to_ascii_lowercase().as_str() {
                "danger" => action.danger = true,
                "sudo" => action.sudo = true,
                "refresh" => action.refresh = true,
                other => {
                    if let Some(seconds) = other.strip_prefix("timeout=") {
                        match seconds.parse::<u64>() {
                            Ok(seconds) => action.timeout_seconds = Some(seconds),
                            Err(_) => {
                                warnings.push(format!("action: bad timeout flag {flag:?}"));
                            }
                        }
                    } else {
                        warnings.push(format!("action: unknown flag {flag:?}"));
                    }
                }
            }
        }
    }

    Ok((action, warnings))
}

// ──────────────────── tests ────────────────────
