use serde::Deserialize;

use crate::errors::ParseError;
use crate::models::equity::EquityQuote;
use crate::models::settings::Endpoints;
use super::traits::{is_blank, ResponseParser};

/// Build the quote URL for one symbol:
/// `{quote_url}{SYMBOL}{api_key_suffix}`.
pub fn quote_url(endpoints: &Endpoints, symbol: &str) -> String {
    format!(
        "{}{}{}",
        endpoints.quote_url,
        urlencoding::encode(&symbol.trim().to_uppercase()),
        endpoints.api_key_suffix
    )
}

// ── Quote API response type ─────────────────────────────────────────

/// `{"c":..,"h":..,"l":..,"o":..,"pc":..,"d":..,"dp":..}`. Every key is
/// required; a `null` value (unknown symbol) fails the parse.
#[derive(Deserialize)]
struct QuotePayload {
    c: f64,
    h: f64,
    l: f64,
    o: f64,
    pc: f64,
    d: f64,
    dp: f64,
}

/// Parses single-quote JSON payloads into an [`EquityQuote`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteParser;

impl ResponseParser for QuoteParser {
    type Output = EquityQuote;

    fn parse(&self, body: &[u8]) -> Result<EquityQuote, ParseError> {
        if is_blank(body) {
            return Err(ParseError::Empty);
        }
        let payload: QuotePayload = serde_json::from_slice(body)?;
        Ok(EquityQuote {
            current: payload.c,
            high: payload.h,
            low: payload.l,
            open: payload.o,
            prev_close: payload.pc,
            change: payload.d,
            change_percent: payload.dp,
        })
    }
}
