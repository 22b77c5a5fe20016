//! Canonical domain types shared by every backend variant.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PriceRecord`] | Normalized OHLCV record with derived change fields |
//! | [`Symbol`] | Validated, uppercased ticker |
//! | [`Market`] | HOSE / HNX / UPCOM |
//! | [`HistoryQuery`] | Ticker plus [`HistoryWindow`] |

mod history;
mod market;
mod price;
mod symbol;

pub use history::{
    HistoryQuery, HistoryWindow, DEFAULT_HISTORY_DAYS, MAX_HISTORY_DAYS, MIN_HISTORY_DAYS,
};
pub use market::Market;
pub(crate) use price::iso_date;
pub use price::{round2, PriceRecord};
pub use symbol::Symbol;
