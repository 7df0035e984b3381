//! OilWatch Library
//!
//! WTI/Brent crude price polling with a cached oracle, rolling history,
//! spread metrics, tanker flows and CSV export.

pub mod config;
pub mod export;
pub mod flows;
pub mod history;
pub mod oracle;
pub mod session;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
