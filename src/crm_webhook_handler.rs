use crate::errors::AppError;
use crate::handlers::AppState;
use crate::tracking::{self, PageScript};
use crate::webhook_models::{CrmAckResponse, CrmEvent, CrmStatusResponse};
use axum::{
    body::Bytes,
    extract::State,
    response::{Html, IntoResponse, Response},
    Json,
};
use minijinja::{context, Value};
use std::sync::Arc;

/// GoHighLevel conversion webhook
///
/// The CRM posts every contact event here. A WhatsApp "message sent" event is
/// answered with a page that fires the fixed-value Ads conversion, keyed by the
/// contact id and carrying the stored gclid. Anything else gets a plain
/// acknowledgment.
///
/// The body is read raw so that malformed JSON is reported as a server error
/// with a JSON body instead of the extractor's default rejection.
#[utoipa::path(
    post,
    path = "/ghl-conversion",
    request_body(content = String, description = "CRM event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Conversion page for WhatsApp message events, acknowledgment otherwise", body = CrmAckResponse),
        (status = 500, description = "Malformed payload")
    )
)]
pub async fn ghl_conversion(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("GHL webhook error: {}", e);
        AppError::InternalError(format!("Invalid CRM payload: {}", e))
    })?;

    let event = CrmEvent::from_value(payload);
    tracing::info!(
        "GHL webhook received: event={}, channel={}, contact_id={}",
        event.event.as_deref().unwrap_or("-"),
        event.channel.as_deref().unwrap_or("-"),
        event.contact_id.as_deref().unwrap_or("-")
    );

    if !event.is_whatsapp_message_sent() {
        return Ok(Json(CrmAckResponse {
            status: "success".to_string(),
            message: "Event processed".to_string(),
        })
        .into_response());
    }

    tracing::info!(
        "WhatsApp message sent: contact_id={}, phone={}, gclid={}, message={}",
        event.contact_id.as_deref().unwrap_or("-"),
        event.phone.as_deref().unwrap_or("-"),
        event.gclid().unwrap_or("-"),
        event.message.as_deref().unwrap_or("")
    );

    let html = render_conversion_page(&state, &event)?;
    Ok(Html(html).into_response())
}

/// Renders the page that reports the CRM conversion to Google Ads.
///
/// The Ads tag is always loaded here regardless of the pixel flag, since
/// firing the conversion is the page's only purpose.
pub fn render_conversion_page(state: &AppState, event: &CrmEvent) -> Result<String, AppError> {
    let conversion = &state.config.conversion;
    let send_to = conversion.send_to();

    let script = PageScript::new().on_load(tracking::crm_conversion(
        &send_to,
        conversion.value,
        &conversion.currency,
        event.contact_id.as_deref().unwrap_or_default(),
        event.gclid().unwrap_or_default(),
    ));

    state.templates.render(
        "conversion.html",
        context! {
            head => state.config.layout.with_ads_pixel().head(&send_to),
            page_script => Value::from_safe_string(script.render()),
        },
    )
}

/// Liveness probe for the CRM integration.
#[utoipa::path(
    get,
    path = "/ghl-conversion",
    responses((status = 200, description = "Webhook is active", body = CrmStatusResponse))
)]
pub async fn ghl_conversion_status() -> Json<CrmStatusResponse> {
    Json(CrmStatusResponse {
        status: "GoHighLevel WhatsApp Conversion Webhook Active".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
