use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

/// Answers whether the market is open at a given instant.
pub trait MarketClock: Send + Sync {
    fn is_open(&self, now: DateTime<Utc>) -> bool;
}

/// NYSE regular session: weekdays 09:30–16:00 New York time.
/// Exchange holidays are not modelled; on those days the quotes simply
/// stop changing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NyseHours;

const OPEN_MINUTE: u32 = 9 * 60 + 30;
const CLOSE_MINUTE: u32 = 16 * 60;

impl MarketClock for NyseHours {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&New_York);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let minute = local.hour() * 60 + local.minute();
        (OPEN_MINUTE..CLOSE_MINUTE).contains(&minute)
    }
}

/// A clock for which the market never closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

impl MarketClock for AlwaysOpen {
    fn is_open(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}
