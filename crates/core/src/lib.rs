//! Rollcall Core — attendance ingestion, reconciliation, aggregation, and database layer.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod reconcile;
pub mod source;
