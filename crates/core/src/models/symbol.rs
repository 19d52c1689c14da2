use serde::{Deserialize, Serialize};

/// One row of the exchange symbol directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolListing {
    /// Symbol in the quote source's convention (e.g. `BRK-A`).
    pub symbol: String,
    pub name: String,
}
