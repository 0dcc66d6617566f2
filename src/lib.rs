//! # AWS Monitor Library
//!
//! Live monitoring for an automatic weather station (AWS) that publishes its
//! readings as text over MQTT.
//!
//! This library provides the ingest-parse-dedupe-persist pipeline that turns
//! broker messages into rows of an append-only store, and the dashboard reader
//! that shows the latest stored row. The two sides share nothing but the store.

pub mod config;
pub mod error;
pub mod station;
pub mod gatekeeper;
pub mod store;
pub mod receiver;
pub mod dashboard;
