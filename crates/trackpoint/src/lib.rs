//! `trackpoint` - Product analytics collection
//!
//! This library provides both halves of an event pipeline: a tracking client
//! that assembles enriched event envelopes from application activity, and a
//! collector that validates, stores and aggregates them over HTTP.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod logging;
pub mod privacy;
pub mod server;
pub mod storage;
pub mod value;

pub use aggregate::AggregationService;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{CollectRequest, EventEnvelope, StoredEvent, Timestamp};
pub use ingest::IngestionService;
pub use logging::init_logging;
pub use storage::{EventStore, StoreSummary};
pub use value::{Properties, Value};
