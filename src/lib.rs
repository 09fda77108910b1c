//! Windows disk inventory and I/O telemetry collection.
//!
//! This crate correlates three independently-keyed naming schemes exposed by
//! the platform's management-instrumentation and performance-counter
//! subsystems into one disk/partition/volume topology, and maintains rolling
//! per-disk I/O counter state across polls.
//!
//! ## Modules
//!
//! - [`collector`]: Full-scan disk enumeration and targeted counter refresh
//! - [`counters`]: Per-disk-index counter state keyed into the live
//!   performance-counter feed
//! - [`topology`]: Disk/partition/volume association maps rebuilt per scan
//! - [`query`]: Tabular query interface consumed from the platform's
//!   instrumentation service
//! - [`parse`]: Defensive parsing of loosely-typed table cells
//! - [`mock`]: Deterministic collaborator implementations for testing
//!
//! The collectors are synchronous and blocking; callers polling from
//! multiple threads must serialize access externally. No operation retries
//! internally, the next poll cycle is the natural retry.

#![forbid(unsafe_code)]

pub mod collector;
pub mod config;
pub mod counters;
pub mod mock;
pub mod parse;
pub mod query;
pub mod topology;

pub use collector::{DiskCollector, DiskDevice, DiskInventory};
pub use config::CollectorConfig;
pub use counters::{CounterError, CounterStore, DiskCounters, PerfSource};
pub use parse::Parsed;
pub use query::{QueryEngine, QueryError, Table, Value};
pub use topology::{Partition, Topology, VolumeResolver};
