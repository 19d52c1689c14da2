use chrono::{DateTime, Duration, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};

use crate::errors::ParseError;
use crate::models::bar::HistoricalBar;
use crate::models::metal::SpotQuote;
use crate::models::settings::Endpoints;
use crate::services::calculation::gain_or_zero;
use super::traits::{is_blank, ResponseParser};

/// Number of bars in the RSI averaging window.
pub const RSI_PERIOD: usize = 14;

/// Window requested when refreshing spot prices (bullion and indices).
pub const SPOT_WINDOW_DAYS: i64 = 7;

/// Window requested for a full history: one year plus three weeks, so the
/// RSI is warmed up over the whole visible year.
pub const HISTORY_WINDOW_DAYS: i64 = 365 + 21;

/// Marker the CSV source uses for missing values.
const MISSING: &str = "null";

/// Build a CSV download URL covering `window` up to `now`.
pub fn history_url(endpoints: &Endpoints, ticker: &str, now: DateTime<Utc>, window: Duration) -> String {
    let period1 = (now - window).timestamp();
    let period2 = now.timestamp();
    format!(
        "{}{}?period1={period1}&period2={period2}&interval=1d&events=history",
        endpoints.history_url,
        urlencoding::encode(ticker),
    )
}

/// Lazily parse a `Date,Open,High,Low,Close,Adj Close,Volume` table.
///
/// Rows containing the `null` marker, an unparseable date or number, or
/// fewer than seven fields are skipped. Empty input, HTML error pages and
/// other garbage simply produce no bars.
pub fn parse_bars(body: &[u8]) -> Bars<'_> {
    let records = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body)
        .into_records();
    Bars {
        records,
        prev_close: None,
    }
}

/// One-pass iterator over the valid rows of a CSV history, in source order.
pub struct Bars<'a> {
    records: StringRecordsIntoIter<&'a [u8]>,
    /// Close of the last row that parsed successfully.
    prev_close: Option<f64>,
}

impl<'a> Bars<'a> {
    /// Attach a 14-period RSI; bars before the warm-up completes are dropped.
    pub fn with_rsi(self) -> RsiBars<Self> {
        RsiBars::new(self)
    }

    fn parse_row(&mut self, record: &StringRecord) -> Option<HistoricalBar> {
        if record.len() < 7 {
            return None;
        }
        if record.iter().any(|field| field.eq_ignore_ascii_case(MISSING)) {
            return None;
        }

        let date = NaiveDate::parse_from_str(record.get(0)?, "%Y-%m-%d").ok()?;
        let open = number(record, 1)?;
        let high = number(record, 2)?;
        let low = number(record, 3)?;
        let close = number(record, 4)?;
        let volume = volume(record.get(6)?)?;

        let prev_close = self.prev_close.unwrap_or(open);
        self.prev_close = Some(close);

        Some(HistoricalBar {
            date,
            open,
            high,
            low,
            close,
            prev_close,
            volume,
            gain_percent: gain_or_zero(close, prev_close),
            rsi: None,
        })
    }
}

impl Iterator for Bars<'_> {
    type Item = HistoricalBar;

    fn next(&mut self) -> Option<HistoricalBar> {
        loop {
            // A row the CSV reader cannot decode is skipped like any other bad row.
            let Ok(record) = self.records.next()? else { continue };
            if let Some(bar) = self.parse_row(&record) {
                return Some(bar);
            }
        }
    }
}

fn number(record: &StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn volume(field: &str) -> Option<u64> {
    field.parse::<u64>().ok().or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Wilder's RSI over [`RSI_PERIOD`] bars.
///
/// The first 13 gains/losses are summed; the 14th is added and the totals
/// divided by 14 to seed the averages, and that bar carries the first RSI.
/// Afterwards each bar updates `avg = (avg * 13 + new) / 14`.
pub struct RsiBars<I> {
    bars: I,
    seen: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl<I> RsiBars<I>
where
    I: Iterator<Item = HistoricalBar>,
{
    pub fn new(bars: I) -> Self {
        Self {
            bars,
            seen: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }
}

impl<I> Iterator for RsiBars<I>
where
    I: Iterator<Item = HistoricalBar>,
{
    type Item = HistoricalBar;

    fn next(&mut self) -> Option<HistoricalBar> {
        let period = RSI_PERIOD as f64;
        loop {
            let mut bar = self.bars.next()?;
            let delta = bar.close - bar.prev_close;
            let (up, down) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
            self.seen += 1;

            if self.seen < RSI_PERIOD {
                self.gain_sum += up;
                self.loss_sum += down;
                continue;
            }

            if self.seen == RSI_PERIOD {
                self.avg_gain = (self.gain_sum + up) / period;
                self.avg_loss = (self.loss_sum + down) / period;
            } else {
                self.avg_gain = (self.avg_gain * (period - 1.0) + up) / period;
                self.avg_loss = (self.avg_loss * (period - 1.0) + down) / period;
            }

            bar.rsi = Some(rsi(self.avg_gain, self.avg_loss));
            return Some(bar);
        }
    }
}

/// `100 - 100 / (1 + avg_gain / avg_loss)`, pinned to 100 when there were no
/// losses (50 when there was no movement at all).
pub fn rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// Parses a full history with RSI; the output type of a history request.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryParser;

impl ResponseParser for HistoryParser {
    type Output = Vec<HistoricalBar>;

    fn parse(&self, body: &[u8]) -> Result<Vec<HistoricalBar>, ParseError> {
        Ok(parse_bars(body).with_rsi().collect())
    }
}

/// Reduces a short CSV window to the latest spot quote: last close, its
/// high/low, and the close before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpotParser;

impl ResponseParser for SpotParser {
    type Output = SpotQuote;

    fn parse(&self, body: &[u8]) -> Result<SpotQuote, ParseError> {
        if is_blank(body) {
            return Err(ParseError::Empty);
        }
        let last = parse_bars(body).last().ok_or(ParseError::NoData)?;
        Ok(SpotQuote {
            price: last.close,
            high: last.high,
            low: last.low,
            prev_close: last.prev_close,
        })
    }
}
