use chrono::{DateTime, Duration, Utc};

use crate::models::index::MarketIndex;
use crate::models::metal::Metal;
use crate::models::resource::ResourceId;
use crate::models::settings::Endpoints;
use crate::services::fetch_coordinator::FetchRequest;

use super::finnhub::quote_url;
use super::yahoo_csv::{history_url, HISTORY_WINDOW_DAYS, SPOT_WINDOW_DAYS};

/// Routes each [`ResourceId`] to the endpoint that serves it.
///
/// - Equities → JSON quote source.
/// - Metals and indices → CSV source, short spot window.
/// - Histories → CSV source, one year plus three weeks.
/// - Symbol directories → the two listing feeds.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Endpoints,
}

impl EndpointRegistry {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// URL for one resource, with CSV windows ending at `now`.
    /// Returns `None` for a directory feed index that does not exist.
    pub fn url_for(&self, resource: &ResourceId, now: DateTime<Utc>) -> Option<String> {
        let spot = Duration::days(SPOT_WINDOW_DAYS);
        let url = match resource {
            ResourceId::Equity(symbol) => quote_url(&self.endpoints, symbol),
            ResourceId::Metal(metal) => history_url(&self.endpoints, metal.ticker(), now, spot),
            ResourceId::Index(index) => history_url(&self.endpoints, index.ticker(), now, spot),
            ResourceId::History(symbol) => history_url(
                &self.endpoints,
                &symbol.trim().to_uppercase(),
                now,
                Duration::days(HISTORY_WINDOW_DAYS),
            ),
            ResourceId::Directory(feed) => self.endpoints.directory_urls.get(*feed)?.clone(),
        };
        Some(url)
    }

    /// A fresh request (new, empty buffer) for one resource.
    pub fn request_for(&self, resource: ResourceId, now: DateTime<Utc>) -> Option<FetchRequest> {
        let url = self.url_for(&resource, now)?;
        Some(FetchRequest::new(resource, url))
    }

    /// Every request of one update cycle: one quote per held symbol, then
    /// all four metals (always, so zero-ounce metals stay priced and the
    /// gold/silver ratio stays current), then the market indices.
    pub fn cycle_requests(&self, symbols: &[String], now: DateTime<Utc>) -> Vec<FetchRequest> {
        let equities = symbols.iter().map(|s| ResourceId::Equity(s.clone()));
        let metals = Metal::ALL.into_iter().map(ResourceId::Metal);
        let indices = MarketIndex::ALL.into_iter().map(ResourceId::Index);

        equities
            .chain(metals)
            .chain(indices)
            .filter_map(|resource| self.request_for(resource, now))
            .collect()
    }

    /// Requests for both symbol-directory feeds.
    pub fn directory_requests(&self, now: DateTime<Utc>) -> Vec<FetchRequest> {
        (0..self.endpoints.directory_urls.len())
            .filter_map(|feed| self.request_for(ResourceId::Directory(feed), now))
            .collect()
    }
}
