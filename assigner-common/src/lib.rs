pub mod config;
pub mod coordination;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod planner;
pub mod records;
pub mod ring;
pub mod test_utils;
pub mod types;
