use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CoreError;

/// User preferences that drive the update loop, as loaded from the
/// persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Fetch cycles per minute. `0` means an unlimited-rate API key:
    /// fetch continuously with 1-second polling.
    pub updates_per_minute: u32,

    /// How long the update loop keeps running, in hours. `0` runs until
    /// cancelled.
    pub hours_of_updates: f64,

    /// Decimal places used by the display formatters.
    pub decimal_places: u8,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            updates_per_minute: 0,
            hours_of_updates: 0.0,
            decimal_places: 2,
        }
    }
}

impl Preferences {
    /// Time between the starts of two consecutive fetch cycles.
    pub fn cycle_interval(&self) -> Duration {
        match self.updates_per_minute {
            0 => Duration::from_secs(1),
            n => Duration::from_micros(60_000_000 / u64::from(n)),
        }
    }

    /// Total running time of the update loop, `None` when unbounded.
    pub fn total_duration(&self) -> Option<Duration> {
        if self.hours_of_updates > 0.0 && self.hours_of_updates.is_finite() {
            Some(Duration::from_secs_f64(self.hours_of_updates * 3600.0))
        } else {
            None
        }
    }
}

/// Where quotes, CSV histories and symbol directories are fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Quote endpoint prefix; the symbol is appended directly.
    pub quote_url: String,

    /// Appended after the symbol, e.g. `&token=<key>`.
    pub api_key_suffix: String,

    /// CSV download prefix; the URL-encoded ticker is appended, followed by
    /// the `period1`/`period2` query.
    pub history_url: String,

    /// The two pipe-delimited exchange listing feeds.
    pub directory_urls: [String; 2],
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            quote_url: "https://finnhub.io/api/v1/quote?symbol=".to_string(),
            api_key_suffix: String::new(),
            history_url: "https://query1.finance.yahoo.com/v7/finance/download/".to_string(),
            directory_urls: [
                "https://www.nasdaqtrader.com/dynamic/SymDir/nasdaqlisted.txt".to_string(),
                "https://www.nasdaqtrader.com/dynamic/SymDir/otherlisted.txt".to_string(),
            ],
        }
    }
}

/// Per-request timeouts and the coordinator's poll quantum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchTimeouts {
    pub connect_ms: u64,
    pub total_ms: u64,
    pub poll_quantum_ms: u64,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            total_ms: 10_000,
            poll_quantum_ms: 40,
        }
    }
}

impl FetchTimeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }

    pub fn poll_quantum(&self) -> Duration {
        Duration::from_millis(self.poll_quantum_ms)
    }
}

/// Complete engine configuration. Every field has a default, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub endpoints: Endpoints,
    pub timeouts: FetchTimeouts,
    pub preferences: Preferences,

    /// Stop the update loop once the NYSE regular session is closed.
    pub respect_market_hours: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            timeouts: FetchTimeouts::default(),
            preferences: Preferences::default(),
            respect_market_hours: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.endpoints.quote_url.trim().is_empty() {
            return Err(CoreError::Config("quote_url must not be empty".into()));
        }
        if self.endpoints.history_url.trim().is_empty() {
            return Err(CoreError::Config("history_url must not be empty".into()));
        }
        if self.timeouts.total_ms == 0 {
            return Err(CoreError::Config("total timeout must be greater than zero".into()));
        }
        if self.timeouts.poll_quantum_ms == 0 {
            return Err(CoreError::Config("poll quantum must be greater than zero".into()));
        }
        Ok(())
    }
}
