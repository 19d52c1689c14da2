pub mod registry;
pub mod traits;

// Transport and response-format implementations
pub mod finnhub;
pub mod http;
pub mod symbol_directory;
pub mod yahoo_csv;
