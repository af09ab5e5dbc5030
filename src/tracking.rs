//! Client-side conversion events and the script that fires them.
//!
//! Every event is addressed to one collector (gtag analytics, the Google Ads
//! conversion pixel, the Meta Pixel) and rendered as a guarded call: a
//! collector whose script never loaded, or that throws, is skipped silently.
//! Navigation to WhatsApp never waits on any of them.
//!
//! The "message likely sent" signal comes from [`EngagementSession`]: the
//! page going hidden and then visible again. It is a heuristic. Switching tabs
//! for an unrelated reason produces a false positive, and a visitor who never
//! comes back produces a false negative.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::time::Duration;

/// Delay before the redirect bridge navigates to WhatsApp.
pub const REDIRECT_DELAY: Duration = Duration::from_secs(2);

/// Time on page after which an extended engagement event fires.
pub const DWELL_THRESHOLD: Duration = Duration::from_secs(10);

const WHATSAPP_CATEGORY: &str = "WhatsApp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collector {
    /// `gtag('event', name, params)`.
    Analytics,
    /// `gtag('event', 'conversion', params)` aimed at a Google Ads `send_to`.
    AdsConversion,
    /// `fbq('track', name, params)`.
    MetaPixel,
}

/// A named event with its collector parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionEvent {
    pub name: String,
    pub params: Map<String, Value>,
}

impl ConversionEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn category(self, category: &str) -> Self {
        self.param("event_category", category)
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        self.param("event_label", label.into())
    }

    pub fn value(self, value: f64) -> Self {
        self.param("value", value)
    }

    pub fn currency(self, currency: &str) -> Self {
        self.param("currency", currency)
    }

    /// Attaches the click id when one was captured; absent ids are left out.
    pub fn click_id(self, click_id: Option<&str>) -> Self {
        match click_id {
            Some(id) => self.param("click_id", id),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// One best-effort call into a collector.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Event {
        collector: Collector,
        event: ConversionEvent,
    },
    /// The site-wide `gtag_report_conversion()` helper defined by the layout.
    ReportConversion,
}

impl Dispatch {
    pub fn analytics(event: ConversionEvent) -> Self {
        Dispatch::Event {
            collector: Collector::Analytics,
            event,
        }
    }

    pub fn ads(event: ConversionEvent) -> Self {
        Dispatch::Event {
            collector: Collector::AdsConversion,
            event,
        }
    }

    pub fn meta(event: ConversionEvent) -> Self {
        Dispatch::Event {
            collector: Collector::MetaPixel,
            event,
        }
    }

    /// Name of the event as the collector will see it.
    pub fn event_name(&self) -> &str {
        match self {
            Dispatch::Event {
                collector: Collector::AdsConversion,
                ..
            } => "conversion",
            Dispatch::Event { event, .. } => &event.name,
            Dispatch::ReportConversion => "gtag_report_conversion",
        }
    }

    /// Renders the guarded JavaScript statement for this dispatch.
    pub fn to_js(&self) -> String {
        let (guard, call) = match self {
            Dispatch::Event {
                collector: Collector::Analytics,
                event,
            } => (
                "gtag",
                format!(
                    "gtag('event', {}, {});",
                    js_literal(&event.name),
                    js_literal(&event.params)
                ),
            ),
            Dispatch::Event {
                collector: Collector::AdsConversion,
                event,
            } => (
                "gtag",
                format!("gtag('event', 'conversion', {});", js_literal(&event.params)),
            ),
            Dispatch::Event {
                collector: Collector::MetaPixel,
                event,
            } => (
                "fbq",
                format!(
                    "fbq('track', {}, {});",
                    js_literal(&event.name),
                    js_literal(&event.params)
                ),
            ),
            Dispatch::ReportConversion => (
                "gtag_report_conversion",
                "gtag_report_conversion();".to_string(),
            ),
        };

        format!(
            "try {{ if (typeof {guard} === 'function') {{ {call} }} }} catch (e) {{}}"
        )
    }
}

/// Serializes a value as a JavaScript literal that is safe inside `<script>`.
pub fn js_literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

/// First 50 characters of a message followed by an ellipsis, used as an event label.
pub fn message_label(message: &str) -> String {
    let prefix: String = message.chars().take(50).collect();
    format!("{}...", prefix)
}

pub fn page_view(title: &str, custom_parameter: &str) -> Vec<Dispatch> {
    vec![Dispatch::analytics(
        ConversionEvent::new("page_view")
            .param("page_title", title)
            .param("custom_parameter", custom_parameter),
    )]
}

/// In-page WhatsApp button click.
pub fn whatsapp_click(message: &str) -> Vec<Dispatch> {
    vec![
        Dispatch::analytics(
            ConversionEvent::new("whatsapp_click")
                .category("engagement")
                .label(message)
                .value(1.0),
        ),
        Dispatch::meta(
            ConversionEvent::new("Contact")
                .param("content_name", "WhatsApp Click")
                .param("content_category", "Contact Form"),
        ),
    ]
}

pub fn redirect_attempt(
    message: &str,
    click_id: Option<&str>,
    utm_source: Option<&str>,
    utm_campaign: Option<&str>,
) -> Vec<Dispatch> {
    vec![
        Dispatch::analytics(
            ConversionEvent::new("whatsapp_redirect_attempt")
                .category(WHATSAPP_CATEGORY)
                .label(message_label(message))
                .click_id(click_id)
                .param("utm_source", utm_source.unwrap_or_default())
                .param("utm_campaign", utm_campaign.unwrap_or_default())
                .value(1.0),
        ),
        Dispatch::meta(
            ConversionEvent::new("InitiateContact")
                .param("content_name", "WhatsApp Redirect")
                .param("content_category", "Contact")
                .click_id(click_id)
                .value(1.0),
        ),
    ]
}

pub fn redirect_executed(message: &str, click_id: Option<&str>) -> Vec<Dispatch> {
    vec![Dispatch::analytics(
        ConversionEvent::new("whatsapp_redirect_executed")
            .category(WHATSAPP_CATEGORY)
            .label(message_label(message))
            .click_id(click_id)
            .value(1.0),
    )]
}

pub fn manual_click(click_id: Option<&str>) -> Vec<Dispatch> {
    vec![Dispatch::analytics(
        ConversionEvent::new("whatsapp_manual_click")
            .category(WHATSAPP_CATEGORY)
            .label("Manual Link Click")
            .click_id(click_id)
            .value(1.0),
    )]
}

pub fn app_opened(click_id: Option<&str>) -> Vec<Dispatch> {
    vec![Dispatch::analytics(
        ConversionEvent::new("whatsapp_app_opened")
            .category(WHATSAPP_CATEGORY)
            .label("App Opened")
            .click_id(click_id)
            .value(1.0),
    )]
}

pub fn potential_message_sent(click_id: Option<&str>) -> Vec<Dispatch> {
    vec![
        Dispatch::analytics(
            ConversionEvent::new("whatsapp_potential_message_sent")
                .category(WHATSAPP_CATEGORY)
                .label("User Returned")
                .click_id(click_id)
                .value(1.0),
        ),
        Dispatch::ReportConversion,
        Dispatch::meta(
            ConversionEvent::new("Contact")
                .param("content_name", "WhatsApp Message Likely Sent")
                .param("content_category", "Conversion")
                .click_id(click_id)
                .value(1.0),
        ),
    ]
}

pub fn extended_engagement(click_id: Option<&str>) -> Vec<Dispatch> {
    vec![Dispatch::analytics(
        ConversionEvent::new("whatsapp_extended_engagement")
            .category(WHATSAPP_CATEGORY)
            .label("Extended Page Time")
            .click_id(click_id)
            .value(1.0),
    )]
}

/// Server-attributed Ads conversion fired from the CRM webhook page.
pub fn crm_conversion(
    send_to: &str,
    value: f64,
    currency: &str,
    transaction_id: &str,
    gclid: &str,
) -> Vec<Dispatch> {
    vec![Dispatch::ads(
        ConversionEvent::new("conversion")
            .param("send_to", send_to)
            .value(value)
            .currency(currency)
            .param("transaction_id", transaction_id)
            .param("gclid", gclid),
    )]
}

/// Per-page engagement state, created at page load and dropped at unload.
///
/// Mirrors the controller object rendered into the page by [`PageScript`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementSession {
    click_id: Option<String>,
    has_been_hidden: bool,
}

impl EngagementSession {
    pub fn start(click_id: Option<&str>) -> Self {
        Self {
            click_id: click_id.map(str::to_string),
            has_been_hidden: false,
        }
    }

    pub fn has_been_hidden(&self) -> bool {
        self.has_been_hidden
    }

    /// Events fired on a `visibilitychange`.
    ///
    /// The first visible→hidden transition fires `whatsapp_app_opened`; any
    /// hidden→visible transition after that fires the "message likely sent"
    /// set. The hidden flag is never reset within a page lifetime.
    pub fn on_visibility_change(&mut self, hidden: bool) -> Vec<Dispatch> {
        if hidden && !self.has_been_hidden {
            self.has_been_hidden = true;
            app_opened(self.click_id.as_deref())
        } else if !hidden && self.has_been_hidden {
            potential_message_sent(self.click_id.as_deref())
        } else {
            Vec::new()
        }
    }

    pub fn on_dwell_elapsed(&self) -> Vec<Dispatch> {
        extended_engagement(self.click_id.as_deref())
    }
}

/// Where a click or timer sends the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Assign `window.location.href` directly.
    Direct(String),
    /// Go through `gtag_report_conversion(url)`, falling back to a direct
    /// assignment when the helper is unavailable.
    ViaConversion(String),
}

impl Navigation {
    fn to_js(&self) -> String {
        match self {
            Navigation::Direct(url) => format!("window.location.href = {};", js_literal(url)),
            Navigation::ViaConversion(url) => format!("navigate({});", js_literal(url)),
        }
    }
}

#[derive(Debug, Clone)]
struct Timer {
    delay: Duration,
    dispatches: Vec<Dispatch>,
    navigation: Option<Navigation>,
}

#[derive(Debug, Clone)]
struct ClickBinding {
    element_id: String,
    dispatches: Vec<Dispatch>,
    navigation: Option<Navigation>,
}

/// Builder for the single tracking script embedded in a page.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    on_load: Vec<Dispatch>,
    timers: Vec<Timer>,
    clicks: Vec<ClickBinding>,
    session: Option<EngagementSession>,
}

impl PageScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load(mut self, dispatches: Vec<Dispatch>) -> Self {
        self.on_load.extend(dispatches);
        self
    }

    pub fn after(
        mut self,
        delay: Duration,
        dispatches: Vec<Dispatch>,
        navigation: Option<Navigation>,
    ) -> Self {
        self.timers.push(Timer {
            delay,
            dispatches,
            navigation,
        });
        self
    }

    /// Fires `dispatches` when the element is clicked. With a navigation the
    /// default action is suppressed and the script navigates after the events
    /// are queued; without one the browser follows the link itself.
    pub fn on_click(
        mut self,
        element_id: impl Into<String>,
        dispatches: Vec<Dispatch>,
        navigation: Option<Navigation>,
    ) -> Self {
        self.clicks.push(ClickBinding {
            element_id: element_id.into(),
            dispatches,
            navigation,
        });
        self
    }

    /// Installs the visibility heuristic and the dwell timer.
    pub fn engagement(mut self, session: EngagementSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn render(&self) -> String {
        let mut js = String::new();
        js.push_str("(function () {\n  'use strict';\n");
        js.push_str("  var session = { hasBeenHidden: false, timers: [] };\n");
        js.push_str(
            "  function navigate(url) {\n    try {\n      if (typeof gtag_report_conversion === 'function') {\n        gtag_report_conversion(url);\n        return;\n      }\n    } catch (e) {}\n    window.location.href = url;\n  }\n",
        );

        for dispatch in &self.on_load {
            let _ = writeln!(js, "  {}", dispatch.to_js());
        }

        for timer in &self.timers {
            js.push_str("  session.timers.push(setTimeout(function () {\n");
            push_body(&mut js, &timer.dispatches, timer.navigation.as_ref());
            let _ = writeln!(js, "  }}, {}));", timer.delay.as_millis());
        }

        for click in &self.clicks {
            let _ = writeln!(
                js,
                "  (function (el) {{\n    if (!el) {{ return; }}\n    el.addEventListener('click', function (event) {{"
            );
            if click.navigation.is_some() {
                js.push_str("      event.preventDefault();\n");
            }
            push_body(&mut js, &click.dispatches, click.navigation.as_ref());
            let _ = writeln!(
                js,
                "    }});\n  }})(document.getElementById({}));",
                js_literal(&click.element_id)
            );
        }

        let mut teardown = String::new();
        if let Some(session) = &self.session {
            let click_id = session.click_id.as_deref();
            js.push_str("  function onVisibilityChange() {\n");
            js.push_str("    if (document.hidden && !session.hasBeenHidden) {\n");
            js.push_str("      session.hasBeenHidden = true;\n");
            for dispatch in app_opened(click_id) {
                let _ = writeln!(js, "      {}", dispatch.to_js());
            }
            js.push_str("    } else if (!document.hidden && session.hasBeenHidden) {\n");
            for dispatch in potential_message_sent(click_id) {
                let _ = writeln!(js, "      {}", dispatch.to_js());
            }
            js.push_str("    }\n  }\n");
            js.push_str("  document.addEventListener('visibilitychange', onVisibilityChange);\n");
            js.push_str("  session.timers.push(setTimeout(function () {\n");
            push_body(&mut js, &session.on_dwell_elapsed(), None);
            let _ = writeln!(js, "  }}, {}));", DWELL_THRESHOLD.as_millis());
            teardown.push_str(
                "    document.removeEventListener('visibilitychange', onVisibilityChange);\n",
            );
        }

        // A page entering the back/forward cache keeps its listeners so the
        // return visit can still be observed.
        js.push_str("  window.addEventListener('pagehide', function (event) {\n");
        js.push_str("    if (event.persisted) { return; }\n");
        js.push_str(&teardown);
        js.push_str("    session.timers.forEach(clearTimeout);\n    session.timers = [];\n  });\n");
        js.push_str("})();\n");
        js
    }
}

fn push_body(js: &mut String, dispatches: &[Dispatch], navigation: Option<&Navigation>) {
    for dispatch in dispatches {
        let _ = writeln!(js, "      {}", dispatch.to_js());
    }
    if let Some(navigation) = navigation {
        let _ = writeln!(js, "      {}", navigation.to_js());
    }
}
