//! Grid computation: places widgets into rows and columns from configuration
//! plus terminal dimensions. Reads only widget identity and size hints,
//! never widget content.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::core::config::{Config, WidgetConfig};

/// Minimum terminal width below which nothing is placed.
pub const MIN_USABLE_COLS: u16 = 40;
/// Minimum terminal height below which nothing is placed.
pub const MIN_USABLE_ROWS: u16 = 8;

/// Check whether the terminal is too small to render anything useful.
#[must_use]
pub const fn is_terminal_too_small(cols: u16, rows: u16) -> bool {
    cols < MIN_USABLE_COLS || rows < MIN_USABLE_ROWS
}

/// Computed position for one widget in one layout pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlacement {
    pub widget_id: String,
    pub row: u16,
    pub column: u16,
    pub column_span: u16,
    pub height: u16,
    pub is_pinned: bool,
}

/// One full layout pass: pinned strip + grid + anything that had to be hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub columns: u16,
    pub column_width: u16,
    pub pinned: Vec<LayoutPlacement>,
    pub placements: Vec<LayoutPlacement>,
    /// Ids dropped for lack of vertical space, lowest priority first.
    pub hidden: Vec<String>,
    pub too_small: bool,
}

impl LayoutPlan {
    fn empty(too_small: bool) -> Self {
        Self {
            columns: 1,
            column_width: 0,
            pinned: Vec::new(),
            placements: Vec::new(),
            hidden: Vec::new(),
            too_small,
        }
    }

    /// User-facing indicator replacing hidden widgets.
    #[must_use]
    pub fn hidden_notice(&self) -> Option<String> {
        match self.hidden.len() {
            0 => None,
            n => Some(format!("{n} more widgets — resize to view")),
        }
    }
}

/// Computes layout plans from configuration and terminal dimensions.
pub struct LayoutEngine;

impl LayoutEngine {
    /// Column count for a terminal width under the configured breakpoints.
    #[must_use]
    pub fn column_count(config: &Config, width: u16) -> u16 {
        let crossed = config
            .layout
            .breakpoints
            .iter()
            .filter(|bp| width >= **bp)
            .count();
        u16::try_from(crossed).unwrap_or(u16::MAX - 1) + 1
    }

    /// Compute one layout pass.
    #[must_use]
    pub fn calculate(config: &Config, width: u16, height: u16) -> LayoutPlan {
        if is_terminal_too_small(width, height) {
            let mut plan = LayoutPlan::empty(true);
            plan.hidden = ordered_widgets(config).iter().map(|w| w.id.clone()).collect();
            return plan;
        }

        let columns = Self::column_count(config, width);
        let column_width = width / columns;

        let all = ordered_widgets(config);
        let (mut pinned, regular): (Vec<&WidgetConfig>, Vec<&WidgetConfig>) =
            all.iter().partition(|w| w.pinned);
        pinned.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let pinned_placements: Vec<LayoutPlacement> = pinned
            .iter()
            .enumerate()
            .map(|(index, w)| {
                let column = u16::try_from(index).unwrap_or(u16::MAX);
                LayoutPlacement {
                    widget_id: w.id.clone(),
                    row: 0,
                    column,
                    column_span: 1,
                    height: config.layout.pinned_strip_height,
                    is_pinned: true,
                }
            })
            .collect();

        let available_height = if pinned_placements.is_empty() {
            height
        } else {
            height.saturating_sub(config.layout.pinned_strip_height)
        };

        // Drop lowest-priority widgets until the rest fit vertically.
        let mut visible: Vec<&WidgetConfig> = regular;
        let mut hidden: Vec<String> = Vec::new();
        loop {
            let (placements, _) = flow(config, &visible, columns, available_height);
            if placements.len() == visible.len() || visible.is_empty() {
                return LayoutPlan {
                    columns,
                    column_width,
                    pinned: pinned_placements,
                    placements,
                    hidden,
                    too_small: false,
                };
            }
            // Did not fit: remove the lowest-priority widget (ties: last in
            // order goes first) and retry.
            let victim = visible
                .iter()
                .enumerate()
                .max_by_key(|(index, w)| (w.priority, *index))
                .map(|(index, _)| index);
            match victim {
                Some(index) => hidden.push(visible.remove(index).id.clone()),
                None => break,
            }
        }

        let mut plan = LayoutPlan::empty(false);
        plan.columns = columns;
        plan.column_width = column_width;
        plan.pinned = pinned_placements;
        plan.hidden = hidden;
        plan
    }

    /// Preferred row height for a widget: explicit hint, else content lines
    /// plus borders, clamped into the configured bounds.
    #[must_use]
    pub fn preferred_height(config: &Config, widget: &WidgetConfig) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let from_content = (widget.max_lines as u16).saturating_add(2);
        widget
            .height
            .unwrap_or(from_content)
            .clamp(config.layout.row_min_height, config.layout.row_max_height)
    }
}

/// Enabled widgets in effective order: ids listed in `layout.order` first
/// (deduplicated), then the rest in config order.
#[must_use]
pub fn ordered_widgets(config: &Config) -> Vec<&WidgetConfig> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();

    for id in &config.layout.order {
        if seen.insert(id.as_str()) {
            if let Some(widget) = config.widget(id) {
                if widget.enabled {
                    ordered.push(widget);
                }
            }
        }
    }
    for widget in config.enabled_widgets() {
        if seen.insert(widget.id.as_str()) {
            ordered.push(widget);
        }
    }
    ordered
}

/// Row-major flow. Returns the placements that fit and the height consumed.
fn flow<'a>(
    config: &Config,
    widgets: &[&'a WidgetConfig],
    columns: u16,
    available_height: u16,
) -> (Vec<LayoutPlacement>, u16) {
    let mut placements = Vec::new();
    let mut row: u16 = 0;
    let mut column: u16 = 0;
    let mut used_height: u16 = 0;
    let mut row_height: u16 = 0;

    for widget in widgets {
        let span = widget.width.unwrap_or(1).clamp(1, columns);
        let height = LayoutEngine::preferred_height(config, widget);

        if column + span > columns && column > 0 {
            // Close the current row.
            used_height = used_height.saturating_add(row_height);
            row += 1;
            column = 0;
            row_height = 0;
        }

        if used_height.saturating_add(height.max(row_height)) > available_height {
            // This widget (and by extension the rest of the attempt) does
            // not fit; the caller decides what to drop.
            return (placements, used_height);
        }

        placements.push(LayoutPlacement {
            widget_id: widget.id.clone(),
            row,
            column,
            column_span: span,
            height,
            is_pinned: false,
        });
        row_height = row_height.max(height);
        column += span;
        if column >= columns {
            used_height = used_height.saturating_add(row_height);
            row += 1;
            column = 0;
            row_height = 0;
        }
    }

    used_height = used_height.saturating_add(row_height);
    (placements, used_height)
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(id: &str) -> WidgetConfig {
        WidgetConfig {
            id: id.to_string(),
            path: format!("{id}.sh"),
            ..WidgetConfig::default()
        }
    }

    fn config_with(widgets: Vec<WidgetConfig>) -> Config {
        Config {
            widgets,
            ..Config::default()
        }
    }

    #[test]
    fn default_breakpoints_map_widths_to_columns() {
        let config = Config::default();
        assert_eq!(LayoutEngine::column_count(&config, 90), 1);
        assert_eq!(LayoutEngine::column_count(&config, 150), 2);
        assert_eq!(LayoutEngine::column_count(&config, 200), 3);
        assert_eq!(LayoutEngine::column_count(&config, 300), 4);
    }

    #[test]
    fn breakpoint_edges_are_inclusive_of_the_next_tier() {
        let config = Config::default();
        assert_eq!(LayoutEngine::column_count(&config, 99), 1);
        assert_eq!(LayoutEngine::column_count(&config, 100), 2);
        assert_eq!(LayoutEngine::column_count(&config, 220), 4);
    }

    #[test]
    fn widgets_flow_row_major() {
        let config = config_with(vec![widget("a"), widget("b"), widget("c")]);
        let plan = LayoutEngine::calculate(&config, 150, 60);

        assert_eq!(plan.columns, 2);
        assert_eq!(plan.placements.len(), 3);
        assert_eq!((plan.placements[0].row, plan.placements[0].column), (0, 0));
        assert_eq!((plan.placements[1].row, plan.placements[1].column), (0, 1));
        assert_eq!((plan.placements[2].row, plan.placements[2].column), (1, 0));
        assert!(plan.hidden.is_empty());
    }

    #[test]
    fn width_hint_spans_columns() {
        let mut wide = widget("wide");
        wide.width = Some(2);
        let config = config_with(vec![wide, widget("b")]);
        let plan = LayoutEngine::calculate(&config, 150, 60);

        assert_eq!(plan.placements[0].column_span, 2);
        // b starts a new row since the wide widget filled row 0.
        assert_eq!(plan.placements[1].row, 1);
    }

    #[test]
    fn span_is_clamped_to_column_count() {
        let mut wide = widget("wide");
        wide.width = Some(4);
        let config = config_with(vec![wide]);
        let plan = LayoutEngine::calculate(&config, 90, 60); // 1 column

        assert_eq!(plan.placements[0].column_span, 1);
    }

    #[test]
    fn pinned_widgets_form_a_strip_ordered_by_priority() {
        let mut p1 = widget("zeta");
        p1.pinned = true;
        p1.priority = 2;
        let mut p2 = widget("alpha");
        p2.pinned = true;
        p2.priority = 1;
        let config = config_with(vec![p1, p2, widget("regular")]);
        let plan = LayoutEngine::calculate(&config, 150, 60);

        assert_eq!(plan.pinned.len(), 2);
        assert_eq!(plan.pinned[0].widget_id, "alpha"); // priority 1 first
        assert_eq!(plan.pinned[1].widget_id, "zeta");
        assert!(plan.pinned.iter().all(|p| p.is_pinned && p.row == 0));
        assert_eq!(plan.placements.len(), 1);
    }

    #[test]
    fn low_priority_widgets_drop_first_when_height_is_tight() {
        let mut important = widget("important");
        important.priority = 1;
        let mut expendable = widget("expendable");
        expendable.priority = 3;
        let config = config_with(vec![expendable, important]);

        // Room for exactly one default-height row (12 high) in one column.
        let plan = LayoutEngine::calculate(&config, 90, 14);
        assert_eq!(plan.placements.len(), 1);
        assert_eq!(plan.placements[0].widget_id, "important");
        assert_eq!(plan.hidden, vec!["expendable".to_string()]);
        assert_eq!(
            plan.hidden_notice().unwrap(),
            "1 more widgets — resize to view"
        );
    }

    #[test]
    fn layout_order_overrides_config_order() {
        let mut config = config_with(vec![widget("a"), widget("b"), widget("c")]);
        config.layout.order = vec!["c".to_string(), "a".to_string()];
        let plan = LayoutEngine::calculate(&config, 90, 120);

        let ids: Vec<&str> = plan
            .placements
            .iter()
            .map(|p| p.widget_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_order_entries_collapse_to_one_placement() {
        let mut config = config_with(vec![widget("a"), widget("b")]);
        config.layout.order = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let plan = LayoutEngine::calculate(&config, 90, 120);
        assert_eq!(plan.placements.len(), 2);
    }

    #[test]
    fn disabled_widgets_are_not_placed() {
        let mut off = widget("off");
        off.enabled = false;
        let config = config_with(vec![off, widget("on")]);
        let plan = LayoutEngine::calculate(&config, 90, 120);
        assert_eq!(plan.placements.len(), 1);
        assert_eq!(plan.placements[0].widget_id, "on");
    }

    #[test]
    fn tiny_terminal_places_nothing() {
        let config = config_with(vec![widget("a")]);
        let plan = LayoutEngine::calculate(&config, 20, 5);
        assert!(plan.too_small);
        assert!(plan.placements.is_empty());
        assert_eq!(plan.hidden, vec!["a".to_string()]);
    }

    #[test]
    fn preferred_height_clamps_to_bounds() {
        let config = Config::default();
        let mut w = widget("a");
        w.max_lines = 1; // content+2 = 3, below min 5
        assert_eq!(LayoutEngine::preferred_height(&config, &w), 5);

        w.max_lines = 60; // content+2 = 62, above max 30
        assert_eq!(LayoutEngine::preferred_height(&config, &w), 30);

        w.height = Some(12);
        assert_eq!(LayoutEngine::preferred_height(&config, &w), 12);
    }
}
