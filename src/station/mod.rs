//! # Station Payload Module
//!
//! Text payload handling for the automatic weather station (AWS).
//!
//! This module handles:
//! - Field labels, value ranges and the row store header
//! - Extracting a typed [`protocol::Reading`] from a free-form text payload
//! - Canonical one-decimal formatting into a store-ready [`format::PersistedRow`]

pub mod protocol;
pub mod parser;
pub mod format;
