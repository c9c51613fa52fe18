//! Time-range and aggregation grammar shared by history directives and the
//! store query API.

#![allow(missing_docs)]

use std::time::Duration;

/// How far back a query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// The most recent N samples (`last_N`).
    Samples(u32),
    /// A wall-clock window ending now (`30s`, `10m`, `2h`, `7d`).
    Window(Duration),
}

impl TimeRange {
    /// Parse the range grammar. Case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if let Some(count) = raw.strip_prefix("last_") {
            let n: u32 = count.parse().ok()?;
            return (n > 0).then_some(Self::Samples(n));
        }

        let unit = raw.chars().last()?;
        let digits = &raw[..raw.len() - unit.len_utf8()];
        let n: u64 = digits.parse().ok()?;
        if n == 0 {
            return None;
        }
        let secs = match unit {
            's' => n,
            'm' => n * 60,
            'h' => n * 3600,
            'd' => n * 86_400,
            _ => return None,
        };
        Some(Self::Window(Duration::from_secs(secs)))
    }
}

impl Default for TimeRange {
    /// One hour: the window history directives use when none is given.
    fn default() -> Self {
        Self::Window(Duration::from_secs(3600))
    }
}

/// Aggregation operator over the numeric values in a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    Latest,
    Avg,
    Max,
    Min,
    Sum,
    Count,
}

impl Aggregation {
    /// Parse the operator keyword. Case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "latest" => Some(Self::Latest),
            "avg" | "mean" => Some(Self::Avg),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// Apply the operator to samples ordered oldest-first.
    #[must_use]
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                Self::Count => Some(0.0),
                _ => None,
            };
        }
        match self {
            Self::Latest => values.last().copied(),
            #[allow(clippy::cast_precision_loss)]
            Self::Avg => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Min => values.iter().copied().reduce(f64::min),
            Self::Sum => Some(values.iter().sum()),
            #[allow(clippy::cast_precision_loss)]
            Self::Count => Some(values.len() as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sample_counts() {
        assert_eq!(TimeRange::parse("last_5"), Some(TimeRange::Samples(5)));
        assert_eq!(TimeRange::parse("LAST_30"), Some(TimeRange::Samples(30)));
        assert_eq!(TimeRange::parse("last_0"), None);
        assert_eq!(TimeRange::parse("last_"), None);
    }

    #[test]
    fn parses_durations() {
        assert_eq!(
            TimeRange::parse("30s"),
            Some(TimeRange::Window(Duration::from_secs(30)))
        );
        assert_eq!(
            TimeRange::parse("10m"),
            Some(TimeRange::Window(Duration::from_secs(600)))
        );
        assert_eq!(
            TimeRange::parse("2h"),
            Some(TimeRange::Window(Duration::from_secs(7200)))
        );
        assert_eq!(
            TimeRange::parse("7d"),
            Some(TimeRange::Window(Duration::from_secs(604_800)))
        );
    }

    #[test]
    fn rejects_malformed_ranges() {
        for raw in ["", "m", "10", "10w", "ten_minutes", "-5m", "0h"] {
            assert_eq!(TimeRange::parse(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn aggregation_keywords() {
        assert_eq!(Aggregation::parse("avg"), Some(Aggregation::Avg));
        assert_eq!(Aggregation::parse("MEAN"), Some(Aggregation::Avg));
        assert_eq!(Aggregation::parse("latest"), Some(Aggregation::Latest));
        assert_eq!(Aggregation::parse("median"), None);
    }

    #[test]
    fn avg_over_three_samples() {
        assert_eq!(Aggregation::Avg.apply(&[10.0, 20.0, 30.0]), Some(20.0));
    }

    #[test]
    fn operators_over_samples() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(Aggregation::Latest.apply(&values), Some(2.0));
        assert_eq!(Aggregation::Max.apply(&values), Some(3.0));
        assert_eq!(Aggregation::Min.apply(&values), Some(1.0));
        assert_eq!(Aggregation::Sum.apply(&values), Some(6.0));
        assert_eq!(Aggregation::Count.apply(&values), Some(3.0));
    }

    #[test]
    fn empty_input_yields_none_except_count() {
        assert_eq!(Aggregation::Latest.apply(&[]), None);
        assert_eq!(Aggregation::Avg.apply(&[]), None);
        assert_eq!(Aggregation::Count.apply(&[]), Some(0.0));
    }
}
