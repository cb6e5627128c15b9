//! Automatic interaction tracking.
//!
//! The host UI layer pushes [`Interaction`]s into an [`AutoTracker`], which
//! turns them into standard events. Scroll depth and time on page are explicit
//! state machines, reset on every page view.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::context::PageContext;
use super::dispatcher::EventDispatcher;
use super::element::Element;
use crate::privacy::FormFilter;
use crate::value::{Properties, Value};

/// Event names emitted by the tracker.
pub mod names {
    /// Page load or route change.
    pub const PAGE_VIEW: &str = "page_view";
    /// Any click.
    pub const CLICK: &str = "click";
    /// Form submission.
    pub const FORM_SUBMIT: &str = "form_submit";
    /// A form control gained focus.
    pub const FIELD_FOCUS: &str = "form_field_focus";
    /// A form control lost focus.
    pub const FIELD_BLUR: &str = "form_field_blur";
    /// A scroll-depth threshold was reached.
    pub const SCROLL_DEPTH: &str = "scroll_depth";
    /// The page is being unloaded.
    pub const PAGE_EXIT: &str = "page_exit";
}

/// One control of a submitted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// `name` attribute.
    pub name: String,
    /// `type` attribute.
    pub input_type: Option<String>,
    /// Current value.
    pub value: String,
}

impl FormField {
    /// A field with no explicit type.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type: None,
            value: value.into(),
        }
    }

    /// Set the `type` attribute.
    #[must_use]
    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }
}

/// A UI signal pushed by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// A page loaded or the route changed.
    Navigate(PageContext),
    /// A click at page coordinates.
    Click {
        /// Horizontal page coordinate.
        x: i32,
        /// Vertical page coordinate.
        y: i32,
        /// Clicked element.
        target: Element,
    },
    /// A form was submitted.
    FormSubmit {
        /// The form element.
        form: Element,
        /// The form's controls.
        fields: Vec<FormField>,
    },
    /// A form control gained focus.
    FieldFocus(Element),
    /// A form control lost focus.
    FieldBlur(Element),
    /// The page scrolled.
    Scroll {
        /// Pixels scrolled from the top.
        scroll_top: f64,
        /// Visible height.
        viewport_height: f64,
        /// Total document height.
        document_height: f64,
    },
    /// The page is unloading.
    Unload,
}

/// Percentage of the document seen so far, in `0..=100`.
#[must_use]
pub fn scroll_percent(scroll_top: f64, viewport_height: f64, document_height: f64) -> f64 {
    if document_height <= viewport_height || document_height <= 0.0 {
        return 100.0;
    }
    ((scroll_top + viewport_height) / document_height * 100.0).clamp(0.0, 100.0)
}

/// Reports each threshold exactly once per page, however the user scrolls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollDepthTracker {
    thresholds: Vec<u8>,
    high_water: u8,
    fired: BTreeSet<u8>,
}

impl ScrollDepthTracker {
    /// Create a tracker for the given thresholds (percentages).
    #[must_use]
    pub fn new(thresholds: &[u8]) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self {
            thresholds,
            high_water: 0,
            fired: BTreeSet::new(),
        }
    }

    /// Feed the current scroll percentage; returns thresholds reached for the
    /// first time, in ascending order.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn observe(&mut self, percent: f64) -> Vec<u8> {
        let current = if percent.is_finite() {
            percent.clamp(0.0, 100.0).floor() as u8
        } else {
            0
        };
        self.high_water = self.high_water.max(current);

        let newly: Vec<u8> = self
            .thresholds
            .iter()
            .copied()
            .filter(|t| *t <= self.high_water && !self.fired.contains(t))
            .collect();
        self.fired.extend(&newly);
        newly
    }

    /// Deepest percentage reached.
    #[must_use]
    pub fn high_water_mark(&self) -> u8 {
        self.high_water
    }

    /// Thresholds already reported.
    #[must_use]
    pub fn fired(&self) -> Vec<u8> {
        self.fired.iter().copied().collect()
    }

    /// Forget all progress, for a new page.
    pub fn reset(&mut self) {
        self.high_water = 0;
        self.fired.clear();
    }
}

/// Measures time from page start to the first exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOnPage {
    started: DateTime<Utc>,
    exited: bool,
}

impl TimeOnPage {
    /// Start measuring at `started`.
    #[must_use]
    pub fn start(started: DateTime<Utc>) -> Self {
        Self {
            started,
            exited: false,
        }
    }

    /// Seconds on page at `at`; `None` once an exit was already reported.
    #[allow(clippy::cast_precision_loss)]
    pub fn exit(&mut self, at: DateTime<Utc>) -> Option<f64> {
        if self.exited {
            return None;
        }
        self.exited = true;
        let millis = (at - self.started).num_milliseconds().max(0);
        Some(millis as f64 / 1000.0)
    }
}

#[derive(Debug)]
struct PageState {
    scroll: ScrollDepthTracker,
    time: TimeOnPage,
}

/// Turns pushed interactions into standard events.
#[derive(Debug)]
pub struct AutoTracker {
    dispatcher: Arc<EventDispatcher>,
    filter: FormFilter,
    state: Mutex<PageState>,
}

impl AutoTracker {
    /// Create a tracker emitting through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<EventDispatcher>, scroll_thresholds: &[u8], filter: FormFilter) -> Self {
        Self {
            dispatcher,
            filter,
            state: Mutex::new(PageState {
                scroll: ScrollDepthTracker::new(scroll_thresholds),
                time: TimeOnPage::start(Utc::now()),
            }),
        }
    }

    /// The dispatcher events go through.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Route one interaction.
    pub fn handle(&self, interaction: Interaction) {
        trace!(?interaction, "Interaction received");
        match interaction {
            Interaction::Navigate(page) => self.page_view(page),
            Interaction::Click { x, y, target } => self.click(x, y, &target),
            Interaction::FormSubmit { form, fields } => self.form_submit(&form, &fields),
            Interaction::FieldFocus(field) => self.field_event(names::FIELD_FOCUS, &field),
            Interaction::FieldBlur(field) => self.field_event(names::FIELD_BLUR, &field),
            Interaction::Scroll {
                scroll_top,
                viewport_height,
                document_height,
            } => self.scroll(scroll_percent(scroll_top, viewport_height, document_height)),
            Interaction::Unload => self.unload_at(Utc::now()),
        }
    }

    /// Start a new page: reset page state and emit `page_view`.
    pub fn page_view(&self, page: PageContext) {
        self.page_view_at(page, Utc::now());
    }

    fn page_view_at(&self, page: PageContext, at: DateTime<Utc>) {
        let props = props([
            ("path", Value::from(page.path())),
            ("search", Value::from(page.search())),
            ("hash", Value::from(page.hash())),
        ]);
        self.dispatcher.navigate(page);
        {
            let mut state = self.lock_state();
            state.scroll.reset();
            state.time = TimeOnPage::start(at);
        }
        self.dispatcher.emit(names::PAGE_VIEW, props, None, None);
    }

    /// Emit one `click` with coordinates and element-type flags.
    pub fn click(&self, x: i32, y: i32, target: &Element) {
        let props = props([
            ("x", Value::from(x)),
            ("y", Value::from(y)),
            ("is_button", Value::from(target.is_button())),
            ("is_link", Value::from(target.is_link())),
            ("is_input", Value::from(target.is_input())),
            ("is_image", Value::from(target.is_image())),
            ("href", Value::from(target.node.href.clone())),
        ]);
        self.dispatcher.emit(names::CLICK, props, None, Some(target));
    }

    /// Emit one `form_submit` carrying the non-sensitive field values.
    pub fn form_submit(&self, form: &Element, fields: &[FormField]) {
        let mut values = Properties::new();
        let mut excluded = 0_usize;
        for field in fields {
            match self
                .filter
                .check_field(&field.name, field.input_type.as_deref(), &field.value)
                .into_value()
            {
                Some(value) => {
                    values.insert(field.name.clone(), Value::from(value));
                }
                None => excluded += 1,
            }
        }

        let props = props([
            ("form_id", Value::from(form.node.id.clone())),
            ("form_name", Value::from(form.node.name.clone())),
            ("field_count", Value::from(fields.len())),
            ("excluded_field_count", Value::from(excluded)),
            ("form_fields", Value::Object(values)),
        ]);
        self.dispatcher.emit(names::FORM_SUBMIT, props, None, Some(form));
    }

    fn field_event(&self, event_name: &str, field: &Element) {
        let props = props([
            ("field_name", Value::from(field.node.name.clone())),
            ("field_type", Value::from(field.node.input_type.clone())),
        ]);
        self.dispatcher.emit(event_name, props, None, Some(field));
    }

    /// Emit `form_field_focus` for a control.
    pub fn field_focus(&self, field: &Element) {
        self.field_event(names::FIELD_FOCUS, field);
    }

    /// Emit `form_field_blur` for a control.
    pub fn field_blur(&self, field: &Element) {
        self.field_event(names::FIELD_BLUR, field);
    }

    /// Feed a scroll percentage; emits one `scroll_depth` per newly reached threshold.
    pub fn scroll(&self, percent: f64) {
        let reached = self.lock_state().scroll.observe(percent);
        for depth in reached {
            self.dispatcher
                .emit(names::SCROLL_DEPTH, props([("depth", Value::from(u32::from(depth)))]), None, None);
        }
    }

    /// Emit `page_exit` once for the current page.
    pub fn unload_at(&self, at: DateTime<Utc>) {
        let (seconds, max_depth) = {
            let mut state = self.lock_state();
            (state.time.exit(at), state.scroll.high_water_mark())
        };
        if let Some(seconds) = seconds {
            let props = props([
                ("time_on_page", Value::from(seconds)),
                ("max_scroll_depth", Value::from(u32::from(max_depth))),
            ]);
            self.dispatcher.emit(names::PAGE_EXIT, props, None, None);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn props<const N: usize>(entries: [(&str, Value); N]) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
