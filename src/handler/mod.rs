//! Kapacitor batch UDF plumbing around the indicator engine.

pub mod accepter;
pub mod config;
pub mod macd_handler;
