//! Physical row layouts and their mapping to [`PriceRecord`].
//!
//! | Shape | Table | Change columns |
//! |-------|-------|----------------|
//! | [`RowShape::PrecomputedChange`] | `stock_prices` | stored upstream |
//! | [`RowShape::Ohlcv`] | `Market_Data` | derived from open/close |
//!
//! Queries select columns positionally in the order of [`RowShape::columns`]; dates are
//! bound as `YYYY-MM-DD` text and cast in SQL.

use std::fmt::{Display, Formatter};

use time::Date;

use crate::domain::iso_date;
use crate::session::{RawRow, SqlValue, StoreQuery};
use crate::{round2, Market, PriceRecord, Symbol};

const PRECOMPUTED_COLUMNS: &[&str] = &[
    "ticker",
    "trade_date",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "change",
    "percent_change",
];
const OHLCV_COLUMNS: &[&str] = &[
    "ticker",
    "trade_date",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

const PRECOMPUTED_SELECT: &str = "SELECT ticker, CAST(trade_date AS DATE), \
     CAST(open_price AS DOUBLE), CAST(high_price AS DOUBLE), CAST(low_price AS DOUBLE), \
     CAST(close_price AS DOUBLE), CAST(volume AS BIGINT), \
     CAST(change_amount AS DOUBLE), CAST(change_percent AS DOUBLE)";
const OHLCV_SELECT: &str = "SELECT TICKER, CAST(TRADE_DATE AS DATE), \
     CAST(PX_OPEN AS DOUBLE), CAST(PX_HIGH AS DOUBLE), CAST(PX_LOW AS DOUBLE), \
     CAST(PX_LAST AS DOUBLE), CAST(VOLUME AS BIGINT)";

/// Physical layout of the price table behind a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowShape {
    /// Shape A: carries `change_amount` / `change_percent` and a `market` column.
    PrecomputedChange,
    /// Shape B: OHLCV plus ticker and date only.
    Ohlcv,
}

impl RowShape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrecomputedChange => "a",
            Self::Ohlcv => "b",
        }
    }

    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::PrecomputedChange => PRECOMPUTED_COLUMNS,
            Self::Ohlcv => OHLCV_COLUMNS,
        }
    }

    /// Only Shape A tables record which market a ticker trades on.
    pub const fn supports_market_snapshot(self) -> bool {
        matches!(self, Self::PrecomputedChange)
    }

    const fn select(self) -> &'static str {
        match self {
            Self::PrecomputedChange => PRECOMPUTED_SELECT,
            Self::Ohlcv => OHLCV_SELECT,
        }
    }

    const fn table(self) -> &'static str {
        match self {
            Self::PrecomputedChange => "stock_prices",
            Self::Ohlcv => "Market_Data",
        }
    }

    const fn ticker_column(self) -> &'static str {
        match self {
            Self::PrecomputedChange => "ticker",
            Self::Ohlcv => "TICKER",
        }
    }

    const fn date_column(self) -> &'static str {
        match self {
            Self::PrecomputedChange => "trade_date",
            Self::Ohlcv => "TRADE_DATE",
        }
    }

    /// Most recent row for `symbol`.
    pub fn latest_query(self, symbol: &Symbol) -> StoreQuery {
        let sql = format!(
            "{select} FROM {table} WHERE {ticker} = ? ORDER BY {date} DESC LIMIT 1",
            select = self.select(),
            table = self.table(),
            ticker = self.ticker_column(),
            date = self.date_column(),
        );
        StoreQuery::new(sql, self.columns()).bind(symbol.as_str())
    }

    /// Rows for `symbol` with trade date in `[start, end]`, ascending.
    pub fn history_query(self, symbol: &Symbol, start: Date, end: Date) -> StoreQuery {
        let sql = format!(
            "{select} FROM {table} WHERE {ticker} = ? \
             AND CAST({date} AS DATE) BETWEEN CAST(? AS DATE) AND CAST(? AS DATE) \
             ORDER BY {date} ASC",
            select = self.select(),
            table = self.table(),
            ticker = self.ticker_column(),
            date = self.date_column(),
        );
        StoreQuery::new(sql, self.columns())
            .bind(symbol.as_str())
            .bind(iso_date::format(start).as_str())
            .bind(iso_date::format(end).as_str())
    }

    /// Latest row per ticker within `market`, ordered by ticker.
    pub fn snapshot_query(self, market: Market) -> Option<StoreQuery> {
        if !self.supports_market_snapshot() {
            return None;
        }
        let sql = format!(
            "{select} FROM ( \
               SELECT *, ROW_NUMBER() OVER (PARTITION BY {ticker} ORDER BY {date} DESC) AS rn \
               FROM {table} WHERE market = ? \
             ) latest WHERE rn = 1 ORDER BY {ticker}",
            select = self.select(),
            table = self.table(),
            ticker = self.ticker_column(),
            date = self.date_column(),
        );
        Some(StoreQuery::new(sql, self.columns()).bind(market.as_str()))
    }
}

impl Display for RowShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize one raw row. Never fails: absent numbers become `0`, an absent date stays absent.
pub fn map(row: &RawRow, shape: RowShape) -> PriceRecord {
    let number = |column: &str| row.get(column).as_f64().map_or(0.0, round2);

    let open = number("open");
    let close = number("close");
    let change = match shape {
        RowShape::PrecomputedChange => upstream(row.get("change"))
            .unwrap_or_else(|| PriceRecord::derive_change(open, close)),
        RowShape::Ohlcv => PriceRecord::derive_change(open, close),
    };
    let percent_change = match shape {
        RowShape::PrecomputedChange => upstream(row.get("percent_change"))
            .unwrap_or_else(|| PriceRecord::derive_percent_change(open, change)),
        RowShape::Ohlcv => PriceRecord::derive_percent_change(open, change),
    };

    PriceRecord {
        ticker: ticker(row.get("ticker")),
        trade_date: row.get("trade_date").as_date(),
        open,
        high: number("high"),
        low: number("low"),
        close,
        volume: volume(row.get("volume")),
        change,
        percent_change,
    }
}

fn upstream(value: &SqlValue) -> Option<f64> {
    value.as_f64().map(round2)
}

fn ticker(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(text) => text.trim().to_owned(),
        SqlValue::Int(number) => number.to_string(),
        _ => String::new(),
    }
}

fn volume(value: &SqlValue) -> u64 {
    match value {
        SqlValue::Int(number) => u64::try_from(*number).unwrap_or(0),
        other => other
            .as_f64()
            .filter(|number| number.is_finite() && *number > 0.0)
            .map_or(0, |number| number.round() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn ohlcv_row(open: SqlValue, close: SqlValue) -> RawRow {
        RawRow::new()
            .with("ticker", SqlValue::from("VNM"))
            .with("trade_date", SqlValue::Date(date!(2024 - 03 - 07)))
            .with("open", open)
            .with("high", SqlValue::Float(68_200.0))
            .with("low", SqlValue::Float(67_500.0))
            .with("close", close)
            .with("volume", SqlValue::Int(1_250_000))
    }

    #[test]
    fn ohlcv_rows_derive_change() {
        let record = map(
            &ohlcv_row(SqlValue::Float(67_800.0), SqlValue::Float(68_000.0)),
            RowShape::Ohlcv,
        );

        assert_eq!(record.ticker, "VNM");
        assert_eq!(record.trade_date, Some(date!(2024 - 03 - 07)));
        assert_eq!(record.change, 200.0);
        assert_eq!(record.percent_change, 0.29);
        assert_eq!(record.volume, 1_250_000);
    }

    #[test]
    fn derived_change_matches_emitted_prices() {
        let samples = [
            (10.005, 10.015),
            (99.99, 0.01),
            (0.0, 1_250.0),
            (52_300.0, 51_100.0),
            (3.333, 3.338),
        ];
        for (open, close) in samples {
            let record = map(
                &ohlcv_row(SqlValue::Float(open), SqlValue::Float(close)),
                RowShape::Ohlcv,
            );
            assert_eq!(record.change, round2(record.close - record.open));
            let expected_percent = if record.open == 0.0 {
                0.0
            } else {
                round2(record.change / record.open * 100.0)
            };
            assert_eq!(record.percent_change, expected_percent);
        }
    }

    #[test]
    fn null_close_is_emitted_as_zero() {
        let record = map(
            &ohlcv_row(SqlValue::Float(100.0), SqlValue::Null),
            RowShape::Ohlcv,
        );
        assert_eq!(record.close, 0.0);
        assert_eq!(record.change, -100.0);
        assert_eq!(record.percent_change, -100.0);
    }

    #[test]
    fn precomputed_rows_keep_upstream_change() {
        let row = ohlcv_row(SqlValue::Float(67_800.0), SqlValue::Float(68_000.0))
            .with("change", SqlValue::Float(150.004))
            .with("percent_change", SqlValue::Float(0.2212));

        let record = map(&row, RowShape::PrecomputedChange);
        assert_eq!(record.change, 150.0);
        assert_eq!(record.percent_change, 0.22);
    }

    #[test]
    fn precomputed_rows_fill_missing_change() {
        let row = ohlcv_row(SqlValue::Float(67_800.0), SqlValue::Float(68_000.0));
        let record = map(&row, RowShape::PrecomputedChange);
        assert_eq!(record.change, 200.0);
        assert_eq!(record.percent_change, 0.29);
    }

    #[test]
    fn empty_row_maps_to_zeroes_and_absent_date() {
        let record = map(&RawRow::new(), RowShape::PrecomputedChange);
        assert_eq!(record.ticker, "");
        assert_eq!(record.trade_date, None);
        assert_eq!(
            (record.open, record.high, record.low, record.close),
            (0.0, 0.0, 0.0, 0.0)
        );
        assert_eq!(record.volume, 0);
        assert_eq!(record.change, 0.0);
        assert_eq!(record.percent_change, 0.0);
    }

    #[test]
    fn negative_volume_clamps_to_zero() {
        assert_eq!(volume(&SqlValue::Int(-5)), 0);
        assert_eq!(volume(&SqlValue::Float(12.6)), 13);
        assert_eq!(volume(&SqlValue::from("900")), 900);
    }

    #[test]
    fn snapshot_requires_market_column() {
        assert!(RowShape::Ohlcv.snapshot_query(Market::Hose).is_none());
        let query = RowShape::PrecomputedChange
            .snapshot_query(Market::Hnx)
            .expect("shape a supports snapshots");
        assert!(query.sql.contains("PARTITION BY ticker"));
        assert_eq!(query.params, vec![SqlValue::from("HNX")]);
    }

    #[test]
    fn history_binds_iso_bounds() {
        let symbol = Symbol::parse("fpt").expect("symbol");
        let query = RowShape::Ohlcv.history_query(
            &symbol,
            date!(2024 - 02 - 06),
            date!(2024 - 03 - 07),
        );
        assert!(query.sql.contains("FROM Market_Data"));
        assert_eq!(
            query.params,
            vec![
                SqlValue::from("FPT"),
                SqlValue::from("2024-02-06"),
                SqlValue::from("2024-03-07"),
            ]
        );
        assert_eq!(query.columns.len(), 7);
    }
}
