//! Envelope assembly and fire-and-forget delivery.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::context::{ContextEnricher, PageContext};
use super::element::Element;
use super::identity::IdentityManager;
use crate::error::{Error, Result};
use crate::event::{EventEnvelope, Timestamp};
use crate::value::{Properties, Value};

/// Hands envelopes to the network without blocking the caller.
///
/// Implementations must not panic or return errors into the caller: delivery
/// is at-most-once and failures are only logged.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queue one envelope for delivery.
    fn send(&self, envelope: EventEnvelope);
}

/// Resolves the authenticated user, if the host has one.
pub trait UserResolver: Send + Sync {
    /// The current user identifier.
    fn current_user(&self) -> Option<String>;
}

/// Posts envelopes as JSON to the collect endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The collect endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one envelope and wait for the response.
    ///
    /// Returns the `event_id` the collector assigned, when it reports one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the request fails or the collector
    /// answers with a non-success status.
    pub async fn send_now(&self, envelope: &EventEnvelope) -> Result<Option<i64>> {
        let response = self.client.post(&self.endpoint).json(envelope).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!("collector returned {status}: {body}")));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(body.get("event_id").and_then(serde_json::Value::as_i64))
    }
}

impl Transport for HttpTransport {
    fn send(&self, envelope: EventEnvelope) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event_name = %envelope.event_name, "No async runtime, dropping event");
            return;
        };

        let transport = self.clone();
        handle.spawn(async move {
            match transport.send_now(&envelope).await {
                Ok(id) => debug!(event_name = %envelope.event_name, ?id, "Event delivered"),
                Err(e) => warn!(event_name = %envelope.event_name, error = %e, "Failed to deliver event"),
            }
        });
    }
}

/// Keeps every envelope in memory instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<EventEnvelope>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Names of everything sent so far, oldest first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_name).collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: EventEnvelope) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }
}

/// Builds envelopes from identity, context and caller payload, then sends them.
pub struct EventDispatcher {
    identity: IdentityManager,
    enricher: ContextEnricher,
    transport: Arc<dyn Transport>,
    users: Option<Arc<dyn UserResolver>>,
    page: RwLock<PageContext>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("identity", &self.identity)
            .field("enricher", &self.enricher)
            .field("transport", &self.transport)
            .field("has_user_resolver", &self.users.is_some())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create a dispatcher. The current page starts at `/`.
    #[must_use]
    pub fn new(identity: IdentityManager, enricher: ContextEnricher, transport: Arc<dyn Transport>) -> Self {
        Self {
            identity,
            enricher,
            transport,
            users: None,
            page: RwLock::new(PageContext::default()),
        }
    }

    /// Consult `resolver` when `emit` is called without a user id.
    #[must_use]
    pub fn with_user_resolver(mut self, resolver: Arc<dyn UserResolver>) -> Self {
        self.users = Some(resolver);
        self
    }

    /// Set the current page.
    pub fn navigate(&self, page: PageContext) {
        *self.page.write().unwrap_or_else(PoisonError::into_inner) = page;
    }

    /// The current page.
    #[must_use]
    pub fn page(&self) -> PageContext {
        self.page.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The identity manager stamping envelopes.
    #[must_use]
    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    /// Build the envelope `emit` would send.
    ///
    /// Element descriptors are merged first so caller properties win on
    /// conflicting keys.
    #[must_use]
    pub fn build(
        &self,
        event_name: &str,
        properties: Properties,
        user_id: Option<&str>,
        source_element: Option<&Element>,
    ) -> EventEnvelope {
        let page = self.page();
        let device = self.enricher.describe_device();
        let traffic = self.enricher.describe_traffic_source(&page);

        let mut merged = source_element.map(Element::descriptors).unwrap_or_default();
        merged.extend(properties);

        let user_id = user_id
            .map(String::from)
            .or_else(|| self.users.as_ref().and_then(|u| u.current_user()));

        let mut envelope = EventEnvelope::new(event_name, Timestamp::now(), self.identity.visitor_id());
        envelope.user_id = user_id;
        envelope.session_id = Some(self.identity.session_id());
        envelope.page_path = Some(page.path().to_string());
        envelope.page_title = page.title.clone();
        envelope.referrer = page.referrer.clone();
        envelope.properties = (!merged.is_empty()).then_some(Value::Object(merged));
        envelope.context = Some(self.enricher.context_blob(&device, &traffic));
        envelope.device_type = Some(device.device_type.as_str().to_string());
        envelope.os = Some(device.os.to_string());
        envelope.browser = Some(device.browser.to_string());
        envelope.language = device.language;
        envelope.timezone = self.enricher.environment().timezone.clone();
        envelope.traffic_medium = Some(traffic.medium);
        envelope.traffic_source = Some(traffic.source);
        envelope.traffic_campaign = traffic.campaign;
        envelope
    }

    /// Record one event. Never blocks and never fails.
    pub fn emit(
        &self,
        event_name: &str,
        properties: Properties,
        user_id: Option<&str>,
        source_element: Option<&Element>,
    ) {
        let envelope = self.build(event_name, properties, user_id, source_element);
        debug!(event_name, session_id = ?envelope.session_id, "Emitting event");
        self.transport.send(envelope);
    }
}
