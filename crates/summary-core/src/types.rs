use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Daily OHLCV sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Snapshot quote for a symbol. Fields the provider omits stay `None`,
/// never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealTimeQuote {
    pub symbol: String,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub changes_percentage: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub year_low: Option<f64>,
    pub year_high: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_avg_50: Option<f64>,
    pub price_avg_200: Option<f64>,
    pub volume: Option<u64>,
    pub avg_volume: Option<u64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub eps: Option<f64>,
    pub pe: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

/// Company reference data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub beta: Option<f64>,
    pub vol_avg: Option<u64>,
    pub mkt_cap: Option<f64>,
    pub last_div: Option<f64>,
}

/// Assembled per-symbol output: a flat metric-name to scalar map.
///
/// Values only enter through the `put_*` helpers, which skip absent and
/// non-finite inputs, so a serialized summary never contains `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(Map<String, Value>);

impl Summary {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Insert a numeric metric; absent and non-finite values are dropped.
    pub fn put_f64(&mut self, key: &str, value: Option<f64>) {
        if let Some(v) = value {
            if v.is_finite() {
                self.0.insert(key.to_string(), Value::from(v));
            }
        }
    }

    pub fn put_i64(&mut self, key: &str, value: Option<i64>) {
        if let Some(v) = value {
            self.0.insert(key.to_string(), Value::from(v));
        }
    }

    pub fn put_u64(&mut self, key: &str, value: Option<u64>) {
        if let Some(v) = value {
            self.0.insert(key.to_string(), Value::from(v));
        }
    }

    pub fn put_str(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.0.insert(key.to_string(), Value::from(v));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_skips_absent_values() {
        let mut s = Summary::new();
        s.put_f64("eps", None);
        s.put_f64("pe_ratio", Some(21.4));
        assert!(!s.contains("eps"));
        assert_eq!(s.get_f64("pe_ratio"), Some(21.4));
    }

    #[test]
    fn summary_skips_non_finite_values() {
        let mut s = Summary::new();
        s.put_f64("bad", Some(f64::NAN));
        s.put_f64("worse", Some(f64::INFINITY));
        assert!(s.is_empty());
    }

    #[test]
    fn summary_serializes_without_nulls() {
        let mut s = Summary::new();
        s.put_str("symbol", Some("AAPL"));
        s.put_f64("rsi", None);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"symbol":"AAPL"}"#);
    }

    #[test]
    fn later_insert_overwrites_earlier() {
        let mut s = Summary::new();
        s.put_f64("pe_ratio", Some(30.0));
        s.put_f64("pe_ratio", Some(28.5));
        assert_eq!(s.get_f64("pe_ratio"), Some(28.5));
    }
}
