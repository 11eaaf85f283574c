//! # athanor
//!
//! Inventory and mission backend core for an alchemy workshop.
//!
//! A serialized stock ledger over material quantities, a durable job queue
//! (pgmq) feeding a bounded worker pool that resolves transmutations, a
//! fire-and-forget audit trail, and a periodic monitor that reports stock
//! anomalies and unfinished work. Storage sits behind traits with a
//! Postgres implementation and an in-process one; observability is
//! OpenTelemetry over `tracing`.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod mission;
pub mod model;
pub mod monitor;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod transmutation;
pub mod worker;
