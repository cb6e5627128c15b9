//! Device and traffic-source context.
//!
//! Everything here is a pure function of the [`ClientEnvironment`] and the
//! current [`PageContext`], recomputed for every event.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Fallback for unrecognized OS and browser families.
pub const OTHER: &str = "Other";

/// Fallback traffic medium and source.
pub const DIRECT: &str = "direct";

/// Base used to resolve relative page URLs.
const RELATIVE_BASE: &str = "http://localhost/";

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Static facts about the host the tracker runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEnvironment {
    /// Raw user-agent string.
    pub user_agent: String,
    /// Preferred locale, e.g. `en-US`.
    pub language: Option<String>,
    /// IANA timezone, e.g. `Europe/Berlin`.
    pub timezone: Option<String>,
    /// Physical screen size.
    pub screen: Option<Dimensions>,
    /// Visible viewport size.
    pub viewport: Option<Dimensions>,
}

impl ClientEnvironment {
    /// An environment with only a user agent.
    #[must_use]
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }
}

/// The page an event fires on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    path: String,
    query: Option<String>,
    fragment: Option<String>,
    params: Vec<(String, String)>,
    /// Document title.
    pub title: Option<String>,
    /// Referring URL, if any.
    pub referrer: Option<String>,
}

impl Default for PageContext {
    fn default() -> Self {
        Self::new("/")
    }
}

impl PageContext {
    /// A page at `url`, which may be absolute or a path such as `/posts?utm_source=x`.
    ///
    /// Unparseable input resolves to the root path.
    #[must_use]
    pub fn new(url: &str) -> Self {
        let parsed = Url::parse(url).or_else(|_| Url::parse(RELATIVE_BASE).and_then(|b| b.join(url)));
        match parsed {
            Ok(url) => Self {
                path: url.path().to_string(),
                query: url.query().map(String::from),
                fragment: url.fragment().map(String::from),
                params: url.query_pairs().into_owned().collect(),
                title: None,
                referrer: None,
            },
            Err(_) => Self {
                path: "/".to_string(),
                query: None,
                fragment: None,
                params: Vec::new(),
                title: None,
                referrer: None,
            },
        }
    }

    /// Set the document title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the referrer. An empty referrer means none.
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        let referrer = referrer.into();
        self.referrer = (!referrer.is_empty()).then_some(referrer);
        self
    }

    /// The path component.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string including its leading `?`, or empty.
    #[must_use]
    pub fn search(&self) -> String {
        self.query.as_ref().map(|q| format!("?{q}")).unwrap_or_default()
    }

    /// The fragment including its leading `#`, or empty.
    #[must_use]
    pub fn hash(&self) -> String {
        self.fragment.as_ref().map(|f| format!("#{f}")).unwrap_or_default()
    }

    /// First non-empty value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.params
            .iter()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.clone())
    }
}

/// Coarse device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Phones.
    Mobile,
    /// Tablets.
    Tablet,
    /// Everything else.
    Desktop,
}

impl DeviceType {
    /// The stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        }
    }
}

/// Device description attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Device class.
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    /// Operating system family.
    pub os: &'static str,
    /// Browser family.
    pub browser: &'static str,
    /// Locale, if known.
    pub language: Option<String>,
}

/// The five standard campaign parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

/// Attribution for the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficSource {
    /// `utm_medium`, else `direct`.
    pub medium: String,
    /// `utm_source`, else the referrer, else `direct`.
    pub source: String,
    /// `utm_campaign`, if present.
    pub campaign: Option<String>,
    /// Raw campaign parameters.
    pub utm: UtmParams,
}

/// Derives device and traffic context.
#[derive(Debug, Clone, Default)]
pub struct ContextEnricher {
    environment: ClientEnvironment,
}

impl ContextEnricher {
    /// Create an enricher for `environment`.
    #[must_use]
    pub fn new(environment: ClientEnvironment) -> Self {
        Self { environment }
    }

    /// The environment being described.
    #[must_use]
    pub fn environment(&self) -> &ClientEnvironment {
        &self.environment
    }

    /// Classify the device from the user agent.
    #[must_use]
    pub fn describe_device(&self) -> DeviceInfo {
        let ua = self.environment.user_agent.as_str();
        DeviceInfo {
            device_type: detect_device_type(ua),
            os: detect_os(ua),
            browser: detect_browser(ua),
            language: self.environment.language.clone(),
        }
    }

    /// Attribute the visit from the page's campaign parameters and referrer.
    #[must_use]
    pub fn describe_traffic_source(&self, page: &PageContext) -> TrafficSource {
        let utm = UtmParams {
            utm_source: page.query_param("utm_source"),
            utm_medium: page.query_param("utm_medium"),
            utm_campaign: page.query_param("utm_campaign"),
            utm_term: page.query_param("utm_term"),
            utm_content: page.query_param("utm_content"),
        };

        TrafficSource {
            medium: utm.utm_medium.clone().unwrap_or_else(|| DIRECT.to_string()),
            source: utm
                .utm_source
                .clone()
                .or_else(|| page.referrer.clone())
                .unwrap_or_else(|| DIRECT.to_string()),
            campaign: utm.utm_campaign.clone(),
            utm,
        }
    }

    /// The opaque `context` blob: raw user agent, screen and viewport, geo,
    /// device and traffic attribution.
    #[must_use]
    pub fn context_blob(&self, device: &DeviceInfo, traffic: &TrafficSource) -> Value {
        let env = &self.environment;
        let geo = Value::object([
            ("country", Value::Null),
            ("city", Value::Null),
            ("timezone", Value::from(env.timezone.clone())),
        ]);

        Value::object([
            ("user_agent", Value::from(env.user_agent.as_str())),
            ("screen", dimensions_value(env.screen)),
            ("viewport", dimensions_value(env.viewport)),
            ("geo", geo),
            ("device", to_value(device)),
            ("traffic_source", to_value(traffic)),
        ])
    }
}

fn dimensions_value(dims: Option<Dimensions>) -> Value {
    dims.map_or(Value::Null, |d| {
        Value::object([("width", d.width), ("height", d.height)])
    })
}

fn to_value<T: Serialize>(item: &T) -> Value {
    serde_json::to_value(item)
        .and_then(serde_json::from_value)
        .unwrap_or_default()
}

fn detect_device_type(ua: &str) -> DeviceType {
    let lower = ua.to_ascii_lowercase();
    let android = lower.contains("android");
    if lower.contains("ipad") || lower.contains("tablet") || (android && !lower.contains("mobile")) {
        DeviceType::Tablet
    } else if lower.contains("mobi") || android || lower.contains("iphone") || lower.contains("ipod") {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

fn detect_os(ua: &str) -> &'static str {
    if ua.contains("Android") {
        "Android"
    } else if ["iPhone", "iPad", "iPod"].iter().any(|d| ua.contains(d)) {
        "iOS"
    } else if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Macintosh") || ua.contains("Mac OS X") {
        "macOS"
    } else if ua.contains("Linux") || ua.contains("X11") {
        "Linux"
    } else {
        OTHER
    }
}

fn detect_browser(ua: &str) -> &'static str {
    // order matters: Edge and Chrome UAs also claim Safari
    if ua.contains("Edg/") || ua.contains("Edge/") {
        "Edge"
    } else if ua.contains("Firefox") || ua.contains("FxiOS") {
        "Firefox"
    } else if ua.contains("Chrome") || ua.contains("CriOS") {
        "Chrome"
    } else if ua.contains("Safari") {
        "Safari"
    } else {
        OTHER
    }
}
