pub mod calculation;
pub mod fetch_coordinator;
pub mod format;
pub mod market_hours;
pub mod orchestrator;
pub mod portfolio_service;
