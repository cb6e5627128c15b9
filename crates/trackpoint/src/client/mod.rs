//! The tracking client.
//!
//! An explicit service instance with injected storage and transport:
//!
//! - [`IdentityManager`] allocates visitor and session identifiers.
//! - [`ContextEnricher`] describes the device and traffic source.
//! - [`EventDispatcher`] assembles envelopes and hands them to a [`Transport`].
//! - [`AutoTracker`] turns pushed UI [`Interaction`]s into standard events.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trackpoint::client::{
//!     ClientEnvironment, ContextEnricher, EventDispatcher, IdentityManager, PageContext,
//!     RecordingTransport, Transport,
//! };
//! use trackpoint::value::Properties;
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let dispatcher = EventDispatcher::new(
//!     IdentityManager::in_memory(),
//!     ContextEnricher::new(ClientEnvironment::with_user_agent("Mozilla/5.0")),
//!     Arc::clone(&transport) as Arc<dyn Transport>,
//! );
//!
//! dispatcher.navigate(PageContext::new("/posts"));
//! dispatcher.emit("post_list_viewed", Properties::new(), None, None);
//! assert_eq!(transport.names(), vec!["post_list_viewed"]);
//! ```

pub mod autotrack;
pub mod context;
pub mod dispatcher;
pub mod element;
pub mod identity;

use std::sync::Arc;

pub use autotrack::{AutoTracker, FormField, Interaction, ScrollDepthTracker, TimeOnPage};
pub use context::{ClientEnvironment, ContextEnricher, DeviceInfo, DeviceType, Dimensions, PageContext, TrafficSource};
pub use dispatcher::{EventDispatcher, HttpTransport, RecordingTransport, Transport, UserResolver};
pub use element::{Element, ElementNode};
pub use identity::{FileStore, IdentityManager, KeyValueStore, MemoryStore, StoreError};

use crate::config::Config;

/// Identity backed by the configured identity file, with an in-memory session.
#[must_use]
pub fn identity_from_config(config: &Config) -> IdentityManager {
    IdentityManager::new(
        Arc::new(FileStore::new(config.identity_path())),
        Arc::new(MemoryStore::new()),
    )
}
