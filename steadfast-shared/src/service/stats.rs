/// Growth statistics over a trailing window

use serde::{Deserialize, Serialize};

use crate::models::percentage;

/// Default trailing window in days
pub const DEFAULT_STATS_DAYS: i64 = 30;

/// `{ total, recent, growth }` summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// All rows of the resource
    pub total: i64,

    /// Rows created inside the window
    pub recent: i64,

    /// `recent / total * 100` with two decimals; `"0.00"` for an empty resource
    pub growth: String,

    /// Window size in days
    pub days: i64,
}

impl Stats {
    pub fn compute(total: i64, recent: i64, days: i64) -> Self {
        Self {
            total,
            recent,
            growth: percentage(recent, total),
            days,
        }
    }
}

/// Applies the default and lower bound to a caller-supplied window
pub fn clamp_days(days: Option<i64>) -> i64 {
    days.unwrap_or(DEFAULT_STATS_DAYS).clamp(1, 3650)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_resource_has_zero_growth() {
        let stats = Stats::compute(0, 0, 30);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.recent, 0);
        assert_eq!(stats.growth, "0.00");
    }

    #[test]
    fn test_growth_has_two_decimals() {
        assert_eq!(Stats::compute(3, 1, 7).growth, "33.33");
        assert_eq!(Stats::compute(8, 8, 7).growth, "100.00");
        assert_eq!(Stats::compute(200, 1, 7).growth, "0.50");
    }

    #[test]
    fn test_clamp_days() {
        assert_eq!(clamp_days(None), 30);
        assert_eq!(clamp_days(Some(0)), 1);
        assert_eq!(clamp_days(Some(-3)), 1);
        assert_eq!(clamp_days(Some(90)), 90);
    }
}
