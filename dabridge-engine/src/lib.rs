//! dabridge Polling Engine
//!
//! The polling-and-dispatch core shared by the DA bridges.
//!
//! # Overview
//!
//! This crate provides:
//! - [`DaSource`] and [`Sink`] capability traits isolating the engine from
//!   any concrete transport
//! - [`TagCatalog`] for resolving the configured tag set
//! - [`WorkerPool`] bounding concurrent source reads
//! - [`PollScheduler`] driving the fixed-interval poll cycle
//! - [`BridgeHealth`] counters for observability
//!
//! # Example
//!
//! ```ignore
//! use dabridge_engine::{CatalogSpec, PollScheduler, SchedulerConfig, TagCatalog};
//!
//! let catalog = TagCatalog::resolve(&CatalogSpec::prefix("line1"), source.as_ref()).await?;
//! let scheduler = PollScheduler::new(catalog, source, sink, health, SchedulerConfig::default());
//! let shutdown = scheduler.shutdown_handle();
//! tokio::spawn(scheduler.run());
//! // ...
//! shutdown.signal();
//! ```

mod catalog;
mod error;
mod health;
mod pool;
mod scheduler;
mod sink;
mod source;

pub use catalog::{CatalogSpec, TagCatalog, TagSelection};
pub use error::{EngineError, ReadError, Result, SinkError, WriteError};
pub use health::{BridgeHealth, HealthSnapshot, TagLiveness};
pub use pool::{PollOutcome, PollTask, WorkerPool};
pub use scheduler::{CatalogHandle, PollScheduler, SchedulerConfig, ShutdownHandle};
pub use sink::Sink;
pub use source::DaSource;

// Re-export commonly used types from dabridge-common
pub use dabridge_common::{Quality, Reading, TagPath, TagValue};
