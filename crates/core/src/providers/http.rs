use async_trait::async_trait;
use reqwest::Client;

use crate::errors::{CoreError, TransportError};
use crate::models::settings::FetchTimeouts;
use super::traits::{BodySink, Transport};

const USER_AGENT: &str = concat!("market-tracker-core/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`Transport`].
///
/// - Connect timeout and total transfer timeout come from [`FetchTimeouts`].
/// - The body is read chunk by chunk so a detached request stops promptly.
/// - Non-2xx responses fail the request; the body is not delivered.
/// - Idle connections are not pooled: the update loop and one-off fetches
///   may run on different runtimes, and a pooled connection is bound to the
///   runtime that opened it.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeouts: &FetchTimeouts) -> Result<Self, CoreError> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect())
            .timeout(timeouts.total())
            .pool_max_idle_per_host(0)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CoreError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn fetch(&self, url: &str, sink: &dyn BodySink) -> Result<(), TransportError> {
        let mut resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        while let Some(chunk) = resp.chunk().await? {
            if !sink.write(&chunk) {
                // Detached mid-transfer; nothing more to deliver.
                break;
            }
        }
        Ok(())
    }
}
