//! Resize and reorder operations. These mutate per-widget overrides and the
//! order list in configuration; the caller persists with `Config::save()`.
//! Every op is idempotent and boundary-checked; an out-of-bounds request is
//! a no-op with feedback, never an error.

#![allow(missing_docs)]

use crate::core::config::Config;
use crate::layout::grid::{LayoutEngine, ordered_widgets};

/// Smallest column span a widget can be resized to.
pub const MIN_SPAN: u16 = 1;

/// Outcome of a layout operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    /// Nothing changed; carries the user-facing reason.
    NotApplied(String),
}

impl OpOutcome {
    #[must_use]
    pub const fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Direction for reorder operations within the flowed grid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Earlier,
    Later,
}

/// Grow or shrink a widget's column span by `delta`.
pub fn resize_width(config: &mut Config, id: &str, delta: i32, terminal_width: u16) -> OpOutcome {
    let max_span = LayoutEngine::column_count(config, terminal_width);
    let Some(widget) = config.widget_mut(id) else {
        return OpOutcome::NotApplied(format!("no widget {id:?}"));
    };

    let current = widget.width.unwrap_or(MIN_SPAN);
    let target = i64::from(current) + i64::from(delta);

    if target < i64::from(MIN_SPAN) {
        return OpOutcome::NotApplied(format!("{id} is already at minimum width"));
    }
    if target > i64::from(max_span) {
        return OpOutcome::NotApplied(format!("{id} is already at maximum width"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target = target as u16;
    if target == current {
        return OpOutcome::NotApplied("no change".to_string());
    }

    widget.width = Some(target);
    OpOutcome::Applied
}

/// Grow or shrink a widget's row height by `delta`.
pub fn resize_height(config: &mut Config, id: &str, delta: i32) -> OpOutcome {
    let min = config.layout.row_min_height;
    let max = config.layout.row_max_height;
    let current = match config.widget(id) {
        Some(widget) => LayoutEngine::preferred_height(config, widget),
        None => return OpOutcome::NotApplied(format!("no widget {id:?}")),
    };

    let target = i64::from(current) + i64::from(delta);
    if target < i64::from(min) {
        return OpOutcome::NotApplied(format!("{id} is already at minimum height"));
    }
    if target > i64::from(max) {
        return OpOutcome::NotApplied(format!("{id} is already at maximum height"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target = target as u16;
    if target == current {
        return OpOutcome::NotApplied("no change".to_string());
    }

    let Some(widget) = config.widget_mut(id) else {
        return OpOutcome::NotApplied(format!("no widget {id:?}"));
    };
    widget.height = Some(target);
    OpOutcome::Applied
}

/// Move a widget one position earlier/later in the effective order.
pub fn move_widget(config: &mut Config, id: &str, direction: MoveDirection) -> OpOutcome {
    if config.widget(id).is_none() {
        return OpOutcome::NotApplied(format!("no widget {id:?}"));
    }

    // Materialize the full effective order so a partial `order` list does
    // not silently pin unlisted widgets to the tail.
    let order: Vec<String> = ordered_widgets(config)
        .iter()
        .map(|w| w.id.clone())
        .collect();
    let Some(index) = order.iter().position(|entry| entry == id) else {
        return OpOutcome::NotApplied(format!("{id} is not currently placed"));
    };

    let swap_with = match direction {
        MoveDirection::Earlier => {
            if index == 0 {
                return OpOutcome::NotApplied(format!("{id} is already first"));
            }
            index - 1
        }
        MoveDirection::Later => {
            if index + 1 >= order.len() {
                return OpOutcome::NotApplied(format!("{id} is already last"));
            }
            index + 1
        }
    };

    let mut order = order;
    order.swap(index, swap_with);
    config.layout.order = order;
    OpOutcome::Applied
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WidgetConfig;

    fn config3() -> Config {
        let widget = |id: &str| WidgetConfig {
            id: id.to_string(),
            path: format!("{id}.sh"),
            ..WidgetConfig::default()
        };
        Config {
            widgets: vec![widget("a"), widget("b"), widget("c")],
            ..Config::default()
        }
    }

    #[test]
    fn grow_and_shrink_width() {
        let mut config = config3();
        assert!(resize_width(&mut config, "a", 1, 300).applied()); // 4 columns
        assert_eq!(config.widget("a").unwrap().width, Some(2));
        assert!(resize_width(&mut config, "a", -1, 300).applied());
        assert_eq!(config.widget("a").unwrap().width, Some(1));
    }

    #[test]
    fn shrink_below_minimum_is_a_no_op() {
        let mut config = config3();
        let before = config.clone();
        let outcome = resize_width(&mut config, "a", -1, 300);
        assert_eq!(
            outcome,
            OpOutcome::NotApplied("a is already at minimum width".to_string())
        );
        assert_eq!(config, before, "configuration must be unchanged");
    }

    #[test]
    fn grow_past_column_count_is_a_no_op() {
        let mut config = config3();
        let outcome = resize_width(&mut config, "a", 5, 90); // 1 column terminal
        assert!(!outcome.applied());
        assert_eq!(config.widget("a").unwrap().width, None);
    }

    #[test]
    fn height_resize_respects_bounds() {
        let mut config = config3();
        // Default preferred height is 12 (max_lines 10 + 2).
        assert!(resize_height(&mut config, "a", 3).applied());
        assert_eq!(config.widget("a").unwrap().height, Some(15));

        // Push to the max (30), then one more is a no-op.
        assert!(resize_height(&mut config, "a", 15).applied());
        assert_eq!(config.widget("a").unwrap().height, Some(30));
        assert!(!resize_height(&mut config, "a", 1).applied());
        assert_eq!(config.widget("a").unwrap().height, Some(30));
    }

    #[test]
    fn shrink_height_below_minimum_is_a_no_op() {
        let mut config = config3();
        let before = config.clone();
        assert!(!resize_height(&mut config, "a", -20).applied());
        assert_eq!(config, before);
    }

    #[test]
    fn move_swaps_neighbors_and_materializes_order() {
        let mut config = config3();
        assert!(move_widget(&mut config, "b", MoveDirection::Earlier).applied());
        assert_eq!(
            config.layout.order,
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );

        assert!(move_widget(&mut config, "b", MoveDirection::Later).applied());
        assert_eq!(
            config.layout.order,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn move_past_the_edges_is_a_no_op() {
        let mut config = config3();
        assert_eq!(
            move_widget(&mut config, "a", MoveDirection::Earlier),
            OpOutcome::NotApplied("a is already first".to_string())
        );
        assert_eq!(
            move_widget(&mut config, "c", MoveDirection::Later),
            OpOutcome::NotApplied("c is already last".to_string())
        );
        assert!(config.layout.order.is_empty(), "no-op must not materialize");
    }

    #[test]
    fn unknown_widget_is_feedback_not_error() {
        let mut config = config3();
        assert!(!resize_width(&mut config, "ghost", 1, 300).applied());
        assert!(!move_widget(&mut config, "ghost", MoveDirection::Later).applied());
    }

    #[test]
    fn resize_is_idempotent_at_bounds() {
        let mut config = config3();
        for _ in 0..5 {
            let _ = resize_width(&mut config, "a", -1, 300);
        }
        assert_eq!(config.widget("a").unwrap().width, None);
    }
}
