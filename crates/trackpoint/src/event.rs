//! Event envelope types.
//!
//! An [`EventEnvelope`] is the unit of record: one tracked interaction,
//! stamped with visitor and session identity and enriched with device and
//! traffic context. Once persisted it becomes an immutable [`StoredEvent`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result, REQUIRED_FIELDS};
use crate::value::Value;

/// An instant, carried on the wire as epoch milliseconds.
///
/// Deserialization also accepts RFC 3339 / ISO-8601 strings, naive
/// `YYYY-MM-DDTHH:MM:SS` strings (read as UTC), plain dates, and numeric
/// strings holding epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Build from epoch milliseconds; `None` if out of range.
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Epoch milliseconds.
    #[must_use]
    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// The wrapped instant.
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse any accepted textual representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if the text matches no accepted format.
    pub fn parse(text: &str) -> Result<Self> {
        parse_instant(text.trim(), false)
            .map(Self)
            .ok_or_else(|| Error::invalid_field("timestamp", format!("unrecognized instant '{text}'")))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.millis())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawTimestamp::deserialize(deserializer)?;
        raw.resolve()
            .map_err(|e| serde::de::Error::custom(e.to_string()))?
            .ok_or_else(|| serde::de::Error::custom("empty timestamp"))
    }
}

/// A timestamp exactly as a client sent it, before interpretation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Epoch milliseconds.
    Millis(i64),
    /// Epoch milliseconds with a fractional part.
    Fractional(f64),
    /// Any textual representation.
    Text(String),
}

impl RawTimestamp {
    /// Interpret the raw value. Empty text resolves to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] for values that are not an instant.
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve(&self) -> Result<Option<Timestamp>> {
        match self {
            Self::Millis(ms) => Timestamp::from_millis(*ms)
                .map(Some)
                .ok_or_else(|| Error::invalid_field("timestamp", "epoch millis out of range")),
            Self::Fractional(ms) if ms.is_finite() => Timestamp::from_millis(ms.trunc() as i64)
                .map(Some)
                .ok_or_else(|| Error::invalid_field("timestamp", "epoch millis out of range")),
            Self::Fractional(_) => Err(Error::invalid_field("timestamp", "not a finite number")),
            Self::Text(text) if text.trim().is_empty() => Ok(None),
            Self::Text(text) => Timestamp::parse(text).map(Some),
        }
    }
}

/// Parse a query-string bound. Bare dates are widened to the end of the day
/// when `end_of_day` is set, so `end_date=2024-01-31` includes that day.
///
/// # Errors
///
/// Returns [`Error::InvalidField`] naming `field` if the text is not an instant.
pub fn parse_bound(field: &'static str, text: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    parse_instant(text.trim(), end_of_day)
        .ok_or_else(|| Error::invalid_field(field, format!("unrecognized instant '{text}'")))
}

fn parse_instant(text: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(millis) = text.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    if end_of_day {
        Some(start + TimeDelta::days(1) - TimeDelta::milliseconds(1))
    } else {
        Some(start)
    }
}

/// A validated event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Name of the tracked event.
    pub event_name: String,
    /// When the interaction happened.
    pub timestamp: Timestamp,
    /// Durable visitor identifier.
    pub client_id: String,
    /// Authenticated user, if the host knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Path of the page the event fired on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_path: Option<String>,
    /// Title of the page the event fired on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    /// Referrer of the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Caller-supplied opaque properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    /// Device class (`mobile`, `tablet`, `desktop`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Operating system family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Browser family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Client locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Client IANA timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Attribution medium.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_medium: Option<String>,
    /// Attribution source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_source: Option<String>,
    /// Attribution campaign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_campaign: Option<String>,
    /// Opaque context blob (raw user agent, screen, viewport, UTM parameters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl EventEnvelope {
    /// Create an envelope carrying only the required fields.
    #[must_use]
    pub fn new(event_name: impl Into<String>, timestamp: Timestamp, client_id: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            timestamp,
            client_id: client_id.into(),
            user_id: None,
            session_id: None,
            page_path: None,
            page_title: None,
            referrer: None,
            properties: None,
            device_type: None,
            os: None,
            browser: None,
            language: None,
            timezone: None,
            traffic_medium: None,
            traffic_source: None,
            traffic_campaign: None,
            context: None,
        }
    }

    /// Look up a top-level key of the `properties` object.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|p| p.get(key))
    }
}

/// An envelope as received by the collector, before validation.
///
/// Every field is optional so that a missing required field produces a
/// validation error naming it rather than a decoding failure. Unknown fields
/// are ignored. Optional text fields accept any JSON value: numbers and
/// booleans are stored as their text, nested values as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[allow(missing_docs)]
pub struct CollectRequest {
    pub event_name: Option<String>,
    pub timestamp: Option<RawTimestamp>,
    pub client_id: Option<String>,
    pub user_id: Option<Value>,
    pub session_id: Option<Value>,
    pub page_path: Option<Value>,
    pub page_title: Option<Value>,
    pub referrer: Option<Value>,
    pub properties: Option<Value>,
    pub device_type: Option<Value>,
    pub os: Option<Value>,
    pub browser: Option<Value>,
    pub language: Option<Value>,
    pub timezone: Option<Value>,
    pub traffic_medium: Option<Value>,
    pub traffic_source: Option<Value>,
    pub traffic_campaign: Option<Value>,
    pub context: Option<Value>,
}

impl CollectRequest {
    /// Check required fields and normalize optional ones.
    ///
    /// Empty optional strings become `None`, as do `null` blobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequiredField`] listing every absent or empty
    /// required field, or [`Error::InvalidField`] for an uninterpretable
    /// timestamp.
    pub fn validate(self) -> Result<EventEnvelope> {
        let event_name = non_empty(self.event_name);
        let client_id = non_empty(self.client_id);
        let timestamp = self.timestamp.map(|raw| raw.resolve()).transpose();
        let timestamp_absent = matches!(timestamp, Ok(None | Some(None)));

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .into_iter()
            .zip([event_name.is_none(), timestamp_absent, client_id.is_none()])
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingRequiredField { missing });
        }

        let (Some(event_name), Some(timestamp), Some(client_id)) =
            (event_name, timestamp?.flatten(), client_id)
        else {
            return Err(Error::internal("required fields vanished after validation"));
        };

        Ok(EventEnvelope {
            event_name,
            timestamp,
            client_id,
            user_id: lenient_text(self.user_id),
            session_id: lenient_text(self.session_id),
            page_path: lenient_text(self.page_path),
            page_title: lenient_text(self.page_title),
            referrer: lenient_text(self.referrer),
            properties: self.properties.filter(|v| !v.is_null()),
            device_type: lenient_text(self.device_type),
            os: lenient_text(self.os),
            browser: lenient_text(self.browser),
            language: lenient_text(self.language),
            timezone: lenient_text(self.timezone),
            traffic_medium: lenient_text(self.traffic_medium),
            traffic_source: lenient_text(self.traffic_source),
            traffic_campaign: lenient_text(self.traffic_campaign),
            context: self.context.filter(|v| !v.is_null()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Text for an optional field, whatever JSON type the client used.
fn lenient_text(value: Option<Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        nested @ (Value::Array(_) | Value::Object(_)) => serde_json::to_string(&nested).ok()?,
    };
    non_empty(Some(text))
}

/// An envelope as persisted, with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    /// Surrogate identifier assigned on insert.
    pub id: i64,
    /// The envelope as it was accepted.
    #[serde(flatten)]
    pub envelope: EventEnvelope,
    /// When the row was written.
    pub created_at: Timestamp,
}

/// An inclusive `[start, end]` bound on event timestamps. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// A range with no bounds.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range with both bounds set.
    #[must_use]
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Everything from `start` onwards.
    #[must_use]
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Check whether an instant lies within the range.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| instant >= s) && self.end.is_none_or(|e| instant <= e)
    }

    /// Lower bound in epoch millis.
    #[must_use]
    pub fn start_millis(&self) -> Option<i64> {
        self.start.map(|dt| dt.timestamp_millis())
    }

    /// Upper bound in epoch millis.
    #[must_use]
    pub fn end_millis(&self) -> Option<i64> {
        self.end.map(|dt| dt.timestamp_millis())
    }
}

/// Filters for listing raw events. All set fields are combined with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct EventFilter {
    pub event_name: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub range: TimeRange,
    pub limit: u32,
    pub offset: u32,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            event_name: None,
            client_id: None,
            user_id: None,
            session_id: None,
            range: TimeRange::unbounded(),
            limit: 100,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> CollectRequest {
        serde_json::from_str(json).expect("valid request json")
    }

    #[test]
    fn test_timestamp_accepts_epoch_millis() {
        let ts: Timestamp = serde_json::from_str("1700000000123").unwrap();
        assert_eq!(ts.millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_timestamp_accepts_iso8601() {
        let ts: Timestamp = serde_json::from_str(r#""2023-11-14T22:13:20.123Z""#).unwrap();
        assert_eq!(ts.millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_timestamp_serializes_as_millis() {
        let ts = Timestamp::from_millis(1_700_000_000_123).unwrap();
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1700000000123");
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(serde_json::from_str::<Timestamp>(r#""yesterday-ish""#).is_err());
        assert!(Timestamp::parse("31/12/2024").is_err());
    }

    #[test]
    fn test_parse_bound_date_only() {
        let start = parse_bound("start_date", "2024-01-31", false).unwrap();
        let end = parse_bound("end_date", "2024-01-31", true).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-01-31T00:00:00+00:00");
        assert_eq!(
            end.timestamp_millis() - start.timestamp_millis(),
            24 * 60 * 60 * 1000 - 1
        );
    }

    #[test]
    fn test_parse_bound_naive_datetime_is_utc() {
        let dt = parse_bound("start_date", "2024-01-31 10:00:00", false).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-31T10:00:00+00:00");
    }

    #[test]
    fn test_validate_complete_request() {
        let envelope = request(
            r#"{"event_name": "page_view", "timestamp": 1700000000000, "client_id": "c1",
                "session_id": "s1", "page_path": "/", "properties": {"a": 1}}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(envelope.event_name, "page_view");
        assert_eq!(envelope.client_id, "c1");
        assert_eq!(envelope.session_id.as_deref(), Some("s1"));
        assert_eq!(envelope.property("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let err = request(r#"{"session_id": "s1"}"#).validate().unwrap_err();
        match err {
            Error::MissingRequiredField { missing } => {
                assert_eq!(missing, vec!["event_name", "timestamp", "client_id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_treats_empty_strings_as_missing() {
        let err = request(r#"{"event_name": "", "timestamp": "", "client_id": "  "}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref missing } if missing.len() == 3));
    }

    #[test]
    fn test_validate_invalid_timestamp() {
        let err = request(r#"{"event_name": "x", "timestamp": "soon", "client_id": "c"}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "timestamp", .. }));
    }

    #[test]
    fn test_validate_missing_wins_over_invalid() {
        let err = request(r#"{"timestamp": "soon", "client_id": "c"}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref missing } if missing == &vec!["event_name"]));
    }

    #[test]
    fn test_validate_normalizes_optional_fields() {
        let envelope = request(
            r#"{"event_name": "x", "timestamp": 1, "client_id": "c", "user_id": 42,
                "referrer": "", "properties": null, "unknown_field": true}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(envelope.user_id.as_deref(), Some("42"));
        assert!(envelope.referrer.is_none());
        assert!(envelope.properties.is_none());
    }

    #[test]
    fn test_validate_accepts_non_string_optional_fields() {
        let envelope = request(
            r#"{"event_name": "x", "timestamp": 1, "client_id": "c", "session_id": 12345,
                "page_title": 7, "language": true, "traffic_campaign": ["spring", 2],
                "os": null}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(envelope.session_id.as_deref(), Some("12345"));
        assert_eq!(envelope.page_title.as_deref(), Some("7"));
        assert_eq!(envelope.language.as_deref(), Some("true"));
        assert_eq!(envelope.traffic_campaign.as_deref(), Some(r#"["spring",2]"#));
        assert!(envelope.os.is_none());
    }

    #[test]
    fn test_envelope_round_trips_through_collect_request() {
        let mut envelope = EventEnvelope::new("click", Timestamp::from_millis(5).unwrap(), "c");
        envelope.session_id = Some("s".to_string());
        envelope.context = Some(Value::object([("user_agent", "UA")]));

        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: CollectRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.validate().unwrap(), envelope);
    }

    #[test]
    fn test_time_range_contains_is_inclusive() {
        let start = Timestamp::from_millis(1_000).unwrap().as_datetime();
        let end = Timestamp::from_millis(2_000).unwrap().as_datetime();
        let range = TimeRange::between(start, end);

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + TimeDelta::milliseconds(1)));
        assert!(TimeRange::unbounded().contains(end));
        assert!(TimeRange::since(start).contains(end));
    }

    #[test]
    fn test_event_filter_defaults() {
        let filter = EventFilter::default();
        assert_eq!(filter.limit, 100);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.range, TimeRange::unbounded());
    }
}
