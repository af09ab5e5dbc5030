use crate::attribution::{AttributionKey, AttributionParameters};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::tracking::{self, EngagementSession, Navigation, PageScript, REDIRECT_DELAY};
use crate::whatsapp_link::OutboundMessage;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Html,
};
use minijinja::{context, Value};
use std::sync::Arc;

/// Redirect Bridge
///
/// Ad clicks land here with the prefilled message and their attribution in the
/// query string. The interstitial fires the redirect events, sends the visitor
/// to WhatsApp after a short delay and keeps watching the tab to guess whether
/// the message was actually sent.
#[utoipa::path(
    get,
    path = "/whatsapp-redirect",
    params(
        ("message" = String, Query, description = "Prefilled WhatsApp message"),
        ("click_id" = Option<String>, Query, description = "Click identifier to round-trip"),
        ("gclid" = Option<String>, Query, description = "Google Ads click id"),
        ("utm_source" = Option<String>, Query, description = "UTM source"),
        ("utm_campaign" = Option<String>, Query, description = "UTM campaign"),
    ),
    responses(
        (status = 200, description = "Interstitial page", body = String, content_type = "text/html"),
        (status = 400, description = "Message parameter missing")
    )
)]
pub async fn whatsapp_redirect(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Html<String>, AppError> {
    let Query(query) = query.map_err(|e| {
        tracing::warn!("Unreadable redirect query: {}", e);
        AppError::BadRequest("Invalid query string".to_string())
    })?;

    let message = query
        .iter()
        .find(|(name, value)| name == "message" && !value.trim().is_empty())
        .map(|(_, value)| value.clone())
        .ok_or_else(|| AppError::BadRequest("Message parameter is required".to_string()))?;

    let attribution = AttributionParameters::from_query(&query);
    let click_id = attribution.click_id();

    tracing::info!(
        "WhatsApp redirect: click_id={}, utm_source={}, {} attribution parameter(s)",
        click_id.unwrap_or("-"),
        attribution.get(AttributionKey::UtmSource).unwrap_or("-"),
        attribution.len()
    );

    let whatsapp_url = state
        .link_builder
        .build(&OutboundMessage::new(message.clone(), attribution.clone()))?;

    let script = redirect_script(&message, &attribution, &whatsapp_url);

    let html = state.templates.render(
        "redirect.html",
        context! {
            head => state.head(),
            whatsapp_url => &whatsapp_url,
            page_script => Value::from_safe_string(script.render()),
        },
    )?;

    Ok(Html(html))
}

/// Script for the interstitial: load events, the delayed hand-off, the manual
/// fallback link and the engagement heuristic.
pub fn redirect_script(
    message: &str,
    attribution: &AttributionParameters,
    whatsapp_url: &str,
) -> PageScript {
    let click_id = attribution.click_id();

    let mut on_load = tracking::page_view("WhatsApp Redirect", "whatsapp_redirect");
    on_load.extend(tracking::redirect_attempt(
        message,
        click_id,
        attribution.get(AttributionKey::UtmSource),
        attribution.get(AttributionKey::UtmCampaign),
    ));

    PageScript::new()
        .on_load(on_load)
        .after(
            REDIRECT_DELAY,
            tracking::redirect_executed(message, click_id),
            Some(Navigation::Direct(whatsapp_url.to_string())),
        )
        .on_click("manual-link", tracking::manual_click(click_id), None)
        .engagement(EngagementSession::start(click_id))
}
