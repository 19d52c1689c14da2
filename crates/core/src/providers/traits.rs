use async_trait::async_trait;

use crate::errors::{ParseError, TransportError};

/// Receives the body of one transfer, chunk by chunk.
///
/// `write` returns `false` once the request has been detached (cancelled or
/// already terminal); the transport should stop reading at that point.
pub trait BodySink: Send + Sync {
    fn write(&self, chunk: &[u8]) -> bool;
}

/// Abstraction over the shared network transport.
///
/// The fetch coordinator multiplexes many concurrent `fetch` calls over one
/// `Transport`. The HTTP implementation lives in [`super::http`]; tests
/// substitute in-process mocks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name of this transport (for logs/errors).
    fn name(&self) -> &str;

    /// Perform one GET and stream the body into `sink`.
    ///
    /// Per-request failures are returned as a [`TransportError`] and only
    /// affect this request. [`TransportError::Fatal`] signals that the
    /// transport itself is unusable.
    async fn fetch(&self, url: &str, sink: &dyn BodySink) -> Result<(), TransportError>;
}

/// Turns a raw response body into a typed value.
pub trait ResponseParser {
    type Output: Default;

    /// Parse `body`; never panics on malformed input.
    fn parse(&self, body: &[u8]) -> Result<Self::Output, ParseError>;

    /// All-or-nothing parse into `out`: on failure `out` is reset to its
    /// zero state, never left partially written.
    fn parse_into(&self, body: &[u8], out: &mut Self::Output) -> Result<(), ParseError> {
        match self.parse(body) {
            Ok(value) => {
                *out = value;
                Ok(())
            }
            Err(e) => {
                *out = Self::Output::default();
                Err(e)
            }
        }
    }
}

/// True when the body has no content worth handing to a parser.
pub(crate) fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}
