use time::{Date, Duration};

use super::price::iso_date;
use crate::{Symbol, ValidationError};

pub const MIN_HISTORY_DAYS: u16 = 1;
pub const MAX_HISTORY_DAYS: u16 = 365;
pub const DEFAULT_HISTORY_DAYS: u16 = 30;

/// How far back a history query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWindow {
    /// Trailing window ending today.
    Days(u16),
    /// Explicit inclusive range.
    Range { start: Date, end: Date },
}

impl HistoryWindow {
    pub fn days(value: i64) -> Result<Self, ValidationError> {
        if value < i64::from(MIN_HISTORY_DAYS) || value > i64::from(MAX_HISTORY_DAYS) {
            return Err(ValidationError::DaysOutOfRange {
                value,
                min: MIN_HISTORY_DAYS,
                max: MAX_HISTORY_DAYS,
            });
        }
        // bounds checked above
        Ok(Self::Days(value as u16))
    }

    pub fn range(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange {
                start: iso_date::format(start),
                end: iso_date::format(end),
            });
        }
        let span = (end - start).whole_days();
        if span > i64::from(MAX_HISTORY_DAYS) {
            return Err(ValidationError::RangeTooWide {
                days: span,
                max: MAX_HISTORY_DAYS,
            });
        }
        Ok(Self::Range { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds as received from a query string.
    pub fn parse_range(start: &str, end: &str) -> Result<Self, ValidationError> {
        let parse = |value: &str| {
            iso_date::parse(value).ok_or_else(|| ValidationError::InvalidDate {
                value: value.to_owned(),
            })
        };
        Self::range(parse(start)?, parse(end)?)
    }

    /// Inclusive `[start, end]` bounds relative to `today`.
    pub fn bounds(self, today: Date) -> (Date, Date) {
        match self {
            Self::Days(days) => {
                let start = today
                    .checked_sub(Duration::days(i64::from(days)))
                    .unwrap_or(Date::MIN);
                (start, today)
            }
            Self::Range { start, end } => (start, end),
        }
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::Days(DEFAULT_HISTORY_DAYS)
    }
}

/// Ticker plus window; results come back ascending by trade date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub symbol: Symbol,
    pub window: HistoryWindow,
}

impl HistoryQuery {
    pub fn new(symbol: Symbol, window: HistoryWindow) -> Self {
        Self { symbol, window }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn day_count_bounds_are_inclusive() {
        assert!(HistoryWindow::days(1).is_ok());
        assert!(HistoryWindow::days(365).is_ok());
        assert!(matches!(
            HistoryWindow::days(0),
            Err(ValidationError::DaysOutOfRange { value: 0, .. })
        ));
        assert!(matches!(
            HistoryWindow::days(400),
            Err(ValidationError::DaysOutOfRange { value: 400, .. })
        ));
    }

    #[test]
    fn trailing_window_ends_today() {
        let window = HistoryWindow::days(7).expect("valid");
        let (start, end) = window.bounds(date!(2024 - 03 - 10));
        assert_eq!(start, date!(2024 - 03 - 03));
        assert_eq!(end, date!(2024 - 03 - 10));
    }

    #[test]
    fn explicit_range_rejects_inverted_bounds() {
        let err = HistoryWindow::parse_range("2024-03-10", "2024-03-01").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvertedRange { .. }));
        let err = HistoryWindow::parse_range("2024/03/01", "2024-03-10").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidDate { .. }));
    }
}
