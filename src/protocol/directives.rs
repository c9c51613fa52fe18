//! Inline bracket directive grammar for `row:` bodies and the standalone
//! table lines.
//!
//! Only the known keyword set is extracted; any other bracket token (style
//! markup like `[bold]`, future directives) stays in the literal text, which
//! is what keeps the protocol forward-compatible.

use regex::Regex;

use crate::protocol::element::{
    LineStyle, ProgressStyle, RowElement, Scale, StatusState,
};
use crate::store::SeriesKey;
use crate::store::query::{Aggregation, TimeRange};

/// Compiled directive patterns. Build once, reuse for every row.
pub struct DirectiveSet {
    inline: Regex,
    table: Regex,
}

impl DirectiveSet {
    /// Compile the grammar. The keyword set is closed by design.
    #[must_use]
    pub fn new() -> Self {
        let inline = Regex::new(
            r"(?i)\[(status|progress|sparkline|miniprogress|divider|graph|line|datafetch|history_graph|history_sparkline|history_line)(?::([^\]]*))?\]",
        )
        .expect("inline directive pattern is static");
        let table = Regex::new(r"(?i)^\[(table|tablerow):([^\]]*)\]\s*$")
            .expect("table directive pattern is static");
        Self { inline, table }
    }

    /// Extract inline elements from a `row:` body. Returns the leftover
    /// literal text, the elements in order of appearance, and any row-local
    /// warnings (malformed directives are dropped, never fatal).
    #[must_use]
    pub fn parse_row(&self, body: &str) -> (String, Vec<RowElement>, Vec<String>) {
        let mut elements = Vec::new();
        let mut warnings = Vec::new();
        let mut text = String::new();
        let mut last_end = 0;

        for captures in self.inline.captures_iter(body) {
            let whole = captures.get(0).expect("match always has group 0");
            text.push_str(&body[last_end..whole.start()]);
            last_end = whole.end();

            let keyword = captures[1].to_ascii_lowercase();
            let args = captures.get(2).map_or("", |m| m.as_str());
            match build_element(&keyword, args) {
                Ok(element) => elements.push(element),
                Err(warning) => warnings.push(warning),
            }
        }
        text.push_str(&body[last_end..]);

        (text.trim().to_string(), elements, warnings)
    }

    /// Parse a standalone `[table:...]` / `[tablerow:...]` line, if it is one.
    #[must_use]
    pub fn parse_table_line(&self, line: &str) -> Option<RowElement> {
        let captures = self.table.captures(line.trim())?;
        let cells: Vec<String> = captures[2].split('|').map(|c| c.trim().to_string()).collect();
        if captures[1].eq_ignore_ascii_case("table") {
            Some(RowElement::TableHeader { cells })
        } else {
            Some(RowElement::TableRow { cells })
        }
    }
}

impl Default for DirectiveSet {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── element construction ────────────────────

fn build_element(keyword: &str, args: &str) -> Result<RowElement, String> {
    let parts: Vec<&str> = if args.is_empty() {
        Vec::new()
    } else {
        args.split(':').collect()
    };

    match keyword {
        "status" => {
            let state = parts
                .first()
                .and_then(|raw| StatusState::parse(raw))
                .ok_or_else(|| format!("status directive: unknown state {args:?}"))?;
            Ok(RowElement::Status { state })
        }
        "progress" => {
            let value = parse_percent(parts.first().copied())
                .ok_or_else(|| format!("progress directive: bad value {args:?}"))?;
            let mut gradient = None;
            let mut style = ProgressStyle::default();
            for part in parts.iter().skip(1) {
                match part.to_ascii_lowercase().as_str() {
                    "inline" => style = ProgressStyle::Inline,
                    "chart" => style = ProgressStyle::Chart,
                    "" => {}
                    _ => gradient = Some((*part).to_string()),
                }
            }
            Ok(RowElement::Progress {
                value,
                gradient,
                style,
            })
        }
        "sparkline" => {
            let values = parse_values(parts.first().copied().unwrap_or_default());
            if values.is_empty() {
                return Err(format!("sparkline directive: no numeric values in {args:?}"));
            }
            let mut gradient = None;
            let mut width = None;
            for part in parts.iter().skip(1) {
                if let Ok(w) = part.parse::<u16>() {
                    width = Some(w);
                } else if !part.is_empty() {
                    gradient = Some((*part).to_string());
                }
            }
            Ok(RowElement::Sparkline {
                values,
                gradient,
                width,
            })
        }
        "miniprogress" => {
            let value = parse_percent(parts.first().copied())
                .ok_or_else(|| format!("miniprogress directive: bad value {args:?}"))?;
            let width = parts.get(1).and_then(|p| p.parse().ok());
            let gradient = parts
                .get(2)
                .filter(|p| !p.is_empty())
                .map(|p| (*p).to_string());
            Ok(RowElement::MiniProgress {
                value,
                width,
                gradient,
            })
        }
        "divider" => {
            let glyph = parts
                .first()
                .and_then(|p| p.chars().next())
                .unwrap_or('─');
            let color = parts
                .get(1)
                .filter(|p| !p.is_empty())
                .map(|p| (*p).to_string());
            Ok(RowElement::Divider { glyph, color })
        }
        "graph" => {
            let values = parse_values(parts.first().copied().unwrap_or_default());
            if values.is_empty() {
                return Err(format!("graph directive: no numeric values in {args:?}"));
            }
            Ok(RowElement::Graph {
                values,
                gradient: optional(parts.get(1)),
                label: optional(parts.get(2)),
                scale: parts.get(3).and_then(|p| Scale::parse(p)),
                width: parts.get(4).and_then(|p| p.parse().ok()),
            })
        }
        "line" => {
            let values = parse_values(parts.first().copied().unwrap_or_default());
            if values.is_empty() {
                return Err(format!("line directive: no numeric values in {args:?}"));
            }
            Ok(RowElement::Line {
                values,
                gradient: optional(parts.get(1)),
                label: optional(parts.get(2)),
                scale: parts.get(3).and_then(|p| Scale::parse(p)),
                width: parts.get(4).and_then(|p| p.parse().ok()),
                height: parts.get(5).and_then(|p| p.parse().ok()),
                style: parts
                    .get(6)
                    .and_then(|p| LineStyle::parse(p))
                    .unwrap_or_default(),
            })
        }
        "datafetch" => {
            let series = parse_series(parts.first().copied(), "datafetch")?;
            let aggregation = parts
                .get(1)
                .filter(|p| !p.is_empty())
                .map_or(Some(Aggregation::default()), |p| Aggregation::parse(p))
                .ok_or_else(|| format!("datafetch directive: unknown aggregation {args:?}"))?;
            let range = parse_range(parts.get(2), "datafetch")?;
            Ok(RowElement::Datafetch {
                series,
                aggregation,
                range,
                resolved: None,
            })
        }
        "history_graph" => {
            let series = parse_series(parts.first().copied(), "history_graph")?;
            let range = parse_range(parts.get(1), "history_graph")?;
            Ok(RowElement::HistoryGraph {
                series,
                range,
                gradient: optional(parts.get(2)),
                label: optional(parts.get(3)),
                scale: parts.get(4).and_then(|p| Scale::parse(p)),
                width: parts.get(5).and_then(|p| p.parse().ok()),
                values: Vec::new(),
            })
        }
        "history_sparkline" => {
            let series = parse_series(parts.first().copied(), "history_sparkline")?;
            let range = parse_range(parts.get(1), "history_sparkline")?;
            Ok(RowElement::HistorySparkline {
                series,
                range,
                gradient: optional(parts.get(2)),
                width: parts.get(3).and_then(|p| p.parse().ok()),
                values: Vec::new(),
            })
        }
        "history_line" => {
            let series = parse_series(parts.first().copied(), "history_line")?;
            let range = parse_range(parts.get(1), "history_line")?;
            Ok(RowElement::HistoryLine {
                series,
                range,
                gradient: optional(parts.get(2)),
                width: parts.get(3).and_then(|p| p.parse().ok()),
                height: parts.get(4).and_then(|p| p.parse().ok()),
                style: parts
                    .get(5)
                    .and_then(|p| LineStyle::parse(p))
                    .unwrap_or_default(),
                values: Vec::new(),
            })
        }
        _ => Err(format!("unknown directive {keyword:?}")),
    }
}

/// Clamp a percent token into 0..=100. Out-of-range input degrades, it
/// never rejects; non-numeric input is a malformed directive.
fn parse_percent(raw: Option<&str>) -> Option<u8> {
    let value: f64 = raw?.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = value.clamp(0.0, 100.0).round() as u8;
    Some(clamped)
}

/// Comma-separated numeric series; unparsable entries are skipped.
fn parse_values(csv: &str) -> Vec<f64> {
    csv.split(',')
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

fn parse_series(raw: Option<&str>, keyword: &str) -> Result<SeriesKey, String> {
    raw.and_then(SeriesKey::parse)
        .ok_or_else(|| format!("{keyword} directive: expected measurement.field"))
}

/// Missing range falls back to the default window; a present-but-garbled
/// range is a malformed directive.
fn parse_range(raw: Option<&&str>, keyword: &str) -> Result<TimeRange, String> {
    match raw.filter(|p| !p.is_empty()) {
        None => Ok(TimeRange::default()),
        Some(p) => {
            TimeRange::parse(p).ok_or_else(|| format!("{keyword} directive: bad range {p:?}"))
        }
    }
}

fn optional(part: Option<&&str>) -> Option<String> {
    part.filter(|p| !p.is_empty()).map(|p| (*p).to_string())
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> DirectiveSet {
        DirectiveSet::new()
    }

    #[test]
    fn status_and_text_coexist() {
        let (text, elements, warnings) = set().parse_row("[status:ok] disk healthy");
        assert_eq!(text, "disk healthy");
        assert_eq!(
            elements,
            vec![RowElement::Status {
                state: StatusState::Ok
            }]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn progress_clamps_out_of_range() {
        let (_, elements, _) = set().parse_row("[progress:150]");
        assert_eq!(
            elements[0],
            RowElement::Progress {
                value: 100,
                gradient: None,
                style: ProgressStyle::Inline
            }
        );

        let (_, elements, _) = set().parse_row("[progress:-20]");
        assert!(matches!(elements[0], RowElement::Progress { value: 0, .. }));
    }

    #[test]
    fn progress_gradient_and_style() {
        let (_, elements, _) = set().parse_row("[progress:40:blue-red:chart]");
        assert_eq!(
            elements[0],
            RowElement::Progress {
                value: 40,
                gradient: Some("blue-red".to_string()),
                style: ProgressStyle::Chart
            }
        );
    }

    #[test]
    fn multiple_directives_in_one_row_keep_order() {
        let (text, elements, _) =
            set().parse_row("[status:warn] load [progress:80] [sparkline:1,2,3]");
        assert_eq!(text, "load");
        assert_eq!(elements.len(), 3);
        assert!(matches!(elements[0], RowElement::Status { .. }));
        assert!(matches!(elements[1], RowElement::Progress { .. }));
        assert!(matches!(elements[2], RowElement::Sparkline { .. }));
    }

    #[test]
    fn unknown_bracket_tokens_stay_literal() {
        let (text, elements, warnings) = set().parse_row("[bold]Current[/] [blink:x]");
        assert_eq!(text, "[bold]Current[/] [blink:x]");
        assert!(elements.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn malformed_directive_warns_and_drops() {
        let (text, elements, warnings) = set().parse_row("[progress:abc] rest");
        assert_eq!(text, "rest");
        assert!(elements.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("progress"));
    }

    #[test]
    fn sparkline_skips_garbage_values() {
        let (_, elements, _) = set().parse_row("[sparkline:1,x,3,nan:green:20]");
        assert_eq!(
            elements[0],
            RowElement::Sparkline {
                values: vec![1.0, 3.0],
                gradient: Some("green".to_string()),
                width: Some(20),
            }
        );
    }

    #[test]
    fn divider_defaults() {
        let (_, elements, _) = set().parse_row("[divider]");
        assert_eq!(
            elements[0],
            RowElement::Divider {
                glyph: '─',
                color: None
            }
        );

        let (_, elements, _) = set().parse_row("[divider:=:dim]");
        assert_eq!(
            elements[0],
            RowElement::Divider {
                glyph: '=',
                color: Some("dim".to_string())
            }
        );
    }

    #[test]
    fn graph_positional_arguments() {
        let (_, elements, _) = set().parse_row("[graph:1,2,3:heat:Load:0-10:40]");
        let RowElement::Graph {
            values,
            gradient,
            label,
            scale,
            width,
        } = &elements[0]
        else {
            panic!("expected graph, got {:?}", elements[0]);
        };
        assert_eq!(values, &[1.0, 2.0, 3.0]);
        assert_eq!(gradient.as_deref(), Some("heat"));
        assert_eq!(label.as_deref(), Some("Load"));
        assert_eq!(*scale, Scale::parse("0-10"));
        assert_eq!(*width, Some(40));
    }

    #[test]
    fn datafetch_defaults_and_explicit_args() {
        let (_, elements, _) = set().parse_row("[datafetch:cpu.usage]");
        assert_eq!(
            elements[0],
            RowElement::Datafetch {
                series: SeriesKey::parse("cpu.usage").unwrap(),
                aggregation: Aggregation::Latest,
                range: TimeRange::default(),
                resolved: None,
            }
        );

        let (_, elements, _) = set().parse_row("[datafetch:cpu.usage:avg:last_10]");
        assert_eq!(
            elements[0],
            RowElement::Datafetch {
                series: SeriesKey::parse("cpu.usage").unwrap(),
                aggregation: Aggregation::Avg,
                range: TimeRange::Samples(10),
                resolved: None,
            }
        );
    }

    #[test]
    fn history_directives_parse_series_and_range() {
        let (_, elements, warnings) =
            set().parse_row("[history_sparkline:net.rx:30m:blue:24]");
        assert!(warnings.is_empty());
        assert_eq!(
            elements[0],
            RowElement::HistorySparkline {
                series: SeriesKey::parse("net.rx").unwrap(),
                range: TimeRange::parse("30m").unwrap(),
                gradient: Some("blue".to_string()),
                width: Some(24),
                values: Vec::new(),
            }
        );
    }

    #[test]
    fn history_directive_without_series_is_dropped() {
        let (_, elements, warnings) = set().parse_row("[history_graph:nodot:1h]");
        assert!(elements.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let (_, elements, _) = set().parse_row("[STATUS:OK] [Progress:50]");
        assert_eq!(elements.len(), 2);
    }

    #[test]
    fn table_lines_split_cells() {
        let header = set().parse_table_line("[table:Metric|Value]").unwrap();
        assert_eq!(
            header,
            RowElement::TableHeader {
                cells: vec!["Metric".to_string(), "Value".to_string()]
            }
        );

        let row = set().parse_table_line("[tablerow:Average | 41]").unwrap();
        assert_eq!(
            row,
            RowElement::TableRow {
                cells: vec!["Average".to_string(), "41".to_string()]
            }
        );

        assert!(set().parse_table_line("row: [table:x]").is_none());
        assert!(set().parse_table_line("plain text").is_none());
    }
}
