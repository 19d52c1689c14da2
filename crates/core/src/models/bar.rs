use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day parsed from a CSV history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Close of the last successfully parsed row before this one
    /// (this bar's own open for the first row).
    pub prev_close: f64,
    pub volume: u64,
    /// Percent change from `prev_close` to `close` (0 when `prev_close` is 0).
    pub gain_percent: f64,
    /// 14-period RSI; only set on bars produced by the RSI adapter.
    pub rsi: Option<f64>,
}
