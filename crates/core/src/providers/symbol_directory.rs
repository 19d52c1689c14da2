use crate::errors::ParseError;
use crate::models::symbol::SymbolListing;
use super::traits::{is_blank, ResponseParser};

/// Rows with fewer fields than this are trailers or garbage.
const MIN_FIELDS: usize = 7;

/// Exchange test issues that never trade.
const TEST_SYMBOLS: &[&str] = &[
    "ATEST", "CTEST", "MTEST", "NTEST", "PTEST", "ZTEST", "ZAZZT", "ZBZZT", "ZCZZT", "ZJZZT",
    "ZVZZT", "ZWZZT", "ZXZZT", "ZVV", "ZXIET", "ZIEXT",
];

/// Exchange-listing suffixes and their quote-source equivalents.
const SUFFIX_REWRITES: &[(&str, &str)] = &[
    (".W", "-WT"),
    (".U", "-UN"),
    (".A", "-A"),
    (".B", "-B"),
    (".C", "-C"),
    (".R", "-R"),
    (".V", "-V"),
];

/// Rewrite an exchange symbol into the quote source's convention,
/// e.g. `ACAH.U` → `ACAH-UN`, `BRK.A` → `BRK-A`.
pub fn normalize_symbol(symbol: &str) -> String {
    for (suffix, replacement) in SUFFIX_REWRITES {
        if let Some(stem) = symbol.strip_suffix(suffix) {
            if !stem.is_empty() {
                return format!("{stem}{replacement}");
            }
        }
    }
    symbol.to_string()
}

/// Parse one pipe-delimited listing feed (`Symbol|Security Name|...`).
///
/// Discards header and trailer rows, rows mentioning `$`, known test
/// symbols and rows with fewer than seven fields.
pub fn parse_symbol_directory(text: &str) -> Vec<SymbolListing> {
    text.lines()
        .filter(|line| !line.contains('$'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() < MIN_FIELDS {
                return None;
            }
            let symbol = fields[0].trim();
            let name = fields[1].trim();
            if symbol.is_empty()
                || symbol.contains(char::is_whitespace)
                || symbol.eq_ignore_ascii_case("Symbol")
                || TEST_SYMBOLS.contains(&symbol)
            {
                return None;
            }
            Some(SymbolListing {
                symbol: normalize_symbol(symbol),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Merge several feeds into one list sorted by symbol, without duplicates.
/// When a symbol appears in more than one feed the first occurrence wins.
pub fn merge_directories(feeds: Vec<Vec<SymbolListing>>) -> Vec<SymbolListing> {
    let mut merged: Vec<SymbolListing> = feeds.into_iter().flatten().collect();
    merged.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    merged.dedup_by(|later, earlier| later.symbol == earlier.symbol);
    merged
}

/// [`ResponseParser`] wrapper around [`parse_symbol_directory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryParser;

impl ResponseParser for DirectoryParser {
    type Output = Vec<SymbolListing>;

    fn parse(&self, body: &[u8]) -> Result<Vec<SymbolListing>, ParseError> {
        if is_blank(body) {
            return Err(ParseError::Empty);
        }
        let listings = parse_symbol_directory(&String::from_utf8_lossy(body));
        if listings.is_empty() {
            return Err(ParseError::NoData);
        }
        Ok(listings)
    }
}
