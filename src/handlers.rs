use crate::attribution::AttributionParameters;
use crate::config::Config;
use crate::conversion_forwarder::ConversionForwarder;
use crate::errors::AppError;
use crate::layout::Templates;
use crate::tracking::{self, Navigation, PageScript};
use crate::whatsapp_link::{OutboundMessage, WhatsAppLinkBuilder};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    Json,
};
use minijinja::{context, Value};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Builds `wa.me` links for the clinic number.
    pub link_builder: WhatsAppLinkBuilder,
    /// Compiled page templates.
    pub templates: Templates,
    /// Server-side conversion delivery.
    pub forwarder: ConversionForwarder,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        Ok(Self {
            link_builder: WhatsAppLinkBuilder::new(config.whatsapp_phone.clone()),
            templates: Templates::load()?,
            forwarder: ConversionForwarder::new(&config.forwarding)?,
            config,
        })
    }

    /// Shared `<head>` context for the configured layout.
    pub fn head(&self) -> Value {
        self.config.layout.head(&self.config.conversion.send_to())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "clinic-attribution",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// A WhatsApp call-to-action on a marketing page.
struct Cta {
    title: &'static str,
    message: &'static str,
}

const LANDING_CTAS: &[Cta] = &[
    Cta {
        title: "احجز موعدك الآن",
        message: "مرحباً، أرغب في حجز موعد في عيادة ماي دكتور لطب الأسنان",
    },
    Cta {
        title: "تقويم الأسنان",
        message: "مرحباً، أرغب في الاستفسار عن تقويم الأسنان",
    },
    Cta {
        title: "زراعة الأسنان",
        message: "مرحباً، أرغب في الاستفسار عن زراعة الأسنان",
    },
    Cta {
        title: "تبييض الأسنان",
        message: "مرحباً، أرغب في الاستفسار عن تبييض الأسنان",
    },
];

const HOLLYWOOD_SMILE_CTAS: &[Cta] = &[
    Cta {
        title: "احجز استشارتك الآن",
        message: "مرحباً، أرغب في حجز استشارة لابتسامة هوليوود",
    },
    Cta {
        title: "احصل على العرض",
        message: "مرحباً، أرغب في الاستفادة من عرض ابتسامة هوليوود",
    },
];

#[derive(Serialize)]
struct CtaView {
    id: String,
    title: &'static str,
    href: String,
}

/// GET /
pub async fn landing_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Html<String>, AppError> {
    render_marketing_page(&state, "landing.html", "Home", LANDING_CTAS, &query)
}

/// GET /holywoodsmile
pub async fn hollywood_smile_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Html<String>, AppError> {
    render_marketing_page(
        &state,
        "hollywood_smile.html",
        "Hollywood Smile",
        HOLLYWOOD_SMILE_CTAS,
        &query,
    )
}

/// Renders a page whose WhatsApp buttons carry the visitor's attribution.
fn render_marketing_page(
    state: &AppState,
    template: &str,
    page_title: &str,
    ctas: &[Cta],
    query: &[(String, String)],
) -> Result<Html<String>, AppError> {
    let attribution = AttributionParameters::from_query(query);
    tracing::debug!(
        "Rendering {} with {} attribution parameter(s)",
        template,
        attribution.len()
    );

    let mut script = PageScript::new().on_load(tracking::page_view(page_title, "landing"));
    let mut views = Vec::with_capacity(ctas.len());

    for (index, cta) in ctas.iter().enumerate() {
        let href = state
            .link_builder
            .build(&OutboundMessage::new(cta.message, attribution.clone()))?;
        let id = format!("whatsapp-cta-{}", index);

        script = script.on_click(
            id.clone(),
            tracking::whatsapp_click(cta.message),
            Some(Navigation::ViaConversion(href.clone())),
        );
        views.push(CtaView {
            id,
            title: cta.title,
            href,
        });
    }

    let html = state.templates.render(
        template,
        context! {
            head => state.head(),
            ctas => views,
            page_script => Value::from_safe_string(script.render()),
        },
    )?;

    Ok(Html(html))
}
