use serde::{Deserialize, Serialize};
use time::Date;

/// Canonical price record every backend variant converges to.
///
/// All numeric fields are always present; nulls from the store arrive here as `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub ticker: String,
    #[serde(with = "iso_date")]
    pub trade_date: Option<Date>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub change: f64,
    pub percent_change: f64,
}

impl PriceRecord {
    /// `close - open`, rounded to two decimals.
    pub fn derive_change(open: f64, close: f64) -> f64 {
        round2(close - open)
    }

    /// `change / open * 100`, rounded to two decimals; `0` when `open` is zero.
    pub fn derive_percent_change(open: f64, change: f64) -> f64 {
        if open == 0.0 {
            return 0.0;
        }
        round2(change / open * 100.0)
    }
}

/// Round half away from zero to two fraction digits.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // collapse -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// `YYYY-MM-DD` on the wire, `null` when the store had no date.
pub(crate) mod iso_date {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::macros::format_description;
    use time::Date;

    pub fn format(date: Date) -> String {
        date.format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_else(|_| date.to_string())
    }

    pub fn parse(text: &str) -> Option<Date> {
        Date::parse(text.trim(), format_description!("[year]-[month]-[day]")).ok()
    }

    pub fn serialize<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&format(*date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        value
            .map(|text| {
                parse(&text).ok_or_else(|| D::Error::custom(format!("invalid date '{text}'")))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn vnm_change_and_percent() {
        let change = PriceRecord::derive_change(67_800.0, 68_000.0);
        assert_eq!(change, 200.0);
        assert_eq!(PriceRecord::derive_percent_change(67_800.0, change), 0.29);
    }

    #[test]
    fn zero_open_yields_zero_percent() {
        let change = PriceRecord::derive_change(0.0, 1_250.0);
        assert_eq!(PriceRecord::derive_percent_change(0.0, change), 0.0);
    }

    #[test]
    fn rounding_never_produces_negative_zero() {
        assert!(round2(-0.001).is_sign_positive());
        assert_eq!(round2(f64::NAN), 0.0);
    }

    #[test]
    fn serializes_date_as_iso_and_absent_date_as_null() {
        let mut record = PriceRecord {
            ticker: String::from("VNM"),
            trade_date: Some(date!(2024 - 03 - 07)),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
            change: 0.0,
            percent_change: 0.0,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["trade_date"], "2024-03-07");

        record.trade_date = None;
        let json = serde_json::to_value(&record).expect("serialize");
        assert!(json["trade_date"].is_null());
    }
}
