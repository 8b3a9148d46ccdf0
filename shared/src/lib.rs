//! Shared building blocks for the Snag bot: configuration, error types,
//! and the per-process state stores (user registry, rate limiter,
//! pending-selection store, download-directory reaper).
pub mod config;
pub mod errors;
pub mod pending;
pub mod rate_limit;
pub mod reaper;
pub mod registry;
