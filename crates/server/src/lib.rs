//! HTTP surface for the magpie scrape engine.
//!
//! The binary in `main.rs` wires the sqlite stores, source adapters,
//! scheduler and run log together; everything routable lives here so
//! integration tests can drive the router in-process.

pub mod api;
pub mod metrics;
pub mod state;
