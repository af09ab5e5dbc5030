use crate::config::Config;
use crate::conversion_forwarder::ForwardedConversion;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::webhook_models::{
    HubVerification, WebhookAckResponse, WhatsAppInboundMessage, WhatsAppWebhookEnvelope,
};
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use std::sync::{Arc, OnceLock};

const SUBSCRIBE_MODE: &str = "subscribe";

fn click_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"click_id[=:]([^&\s]+)").ok())
        .as_ref()
}

/// Finds a `click_id=...` or `click_id:...` marker in a message body.
pub fn extract_click_id(text: &str) -> Option<&str> {
    click_id_pattern()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Checks a subscription handshake against the configured token.
///
/// Without a configured token every handshake fails.
pub fn verify_subscription(config: &Config, hub: &HubVerification) -> Result<(), AppError> {
    if hub.mode.as_deref() != Some(SUBSCRIBE_MODE) {
        return Err(AppError::Forbidden("hub.mode is not subscribe".to_string()));
    }

    let Some(expected) = config.whatsapp_verify_token.as_deref() else {
        return Err(AppError::Forbidden(
            "WHATSAPP_WEBHOOK_VERIFY_TOKEN is not configured".to_string(),
        ));
    };

    let provided = hub.verify_token.as_deref().unwrap_or_default();
    if !constant_time_compare(provided, expected) {
        return Err(AppError::Forbidden("verify token mismatch".to_string()));
    }

    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn handshake(config: &Config, hub: &HubVerification) -> Result<String, AppError> {
    verify_subscription(config, hub)?;
    tracing::info!("WhatsApp webhook verified");
    Ok(hub.challenge.clone().unwrap_or_default())
}

/// Subscription handshake (GET)
///
/// Echoes `hub.challenge` as plain text when the mode is `subscribe` and the
/// token matches; 403 otherwise, including for an unreadable query string.
#[utoipa::path(
    get,
    path = "/whatsapp-webhook",
    params(
        ("hub.mode" = String, Query, description = "Must be `subscribe`"),
        ("hub.verify_token" = String, Query, description = "Shared verification token"),
        ("hub.challenge" = String, Query, description = "Value echoed back on success"),
    ),
    responses(
        (status = 200, description = "Challenge echoed", body = String, content_type = "text/plain"),
        (status = 403, description = "Verification failed")
    )
)]
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<String, AppError> {
    let Query(query) =
        query.map_err(|e| AppError::Forbidden(format!("unreadable handshake query: {}", e)))?;
    handshake(&state.config, &HubVerification::from_query(&query))
}

/// Event delivery (POST)
///
/// Logs every inbound message and forwards a conversion for each one whose
/// text carries a click id. Forwarding runs in the background, so the
/// platform is acknowledged immediately. A body with a `hub` block is handled
/// as a handshake.
#[utoipa::path(
    post,
    path = "/whatsapp-webhook",
    request_body(content = String, description = "WhatsApp Cloud webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAckResponse),
        (status = 403, description = "Handshake in body failed"),
        (status = 500, description = "Malformed payload")
    )
)]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let envelope: WhatsAppWebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!("WhatsApp webhook error: {}", e);
        AppError::InternalError(format!("Invalid WhatsApp payload: {}", e))
    })?;

    if let Some(hub) = &envelope.hub {
        return handshake(&state.config, hub).map(IntoResponse::into_response);
    }

    let mut forwarded = 0;
    for message in envelope.messages() {
        if process_message(&state, message) {
            forwarded += 1;
        }
    }

    tracing::debug!(
        "WhatsApp webhook processed: object={}, {} conversion(s) forwarded",
        envelope.object.as_deref().unwrap_or("-"),
        forwarded
    );

    Ok(Json(WebhookAckResponse {
        status: "success".to_string(),
    })
    .into_response())
}

/// Logs one inbound message and forwards its conversion. Returns whether a
/// click id was found.
fn process_message(state: &AppState, message: &WhatsAppInboundMessage) -> bool {
    let text = message.body();

    tracing::info!(
        "WhatsApp message received: from={}, type={}, timestamp={}, text={}",
        message.from.as_deref().unwrap_or("-"),
        message.message_type.as_deref().unwrap_or("-"),
        message.timestamp.as_deref().unwrap_or("-"),
        text
    );

    let Some(click_id) = extract_click_id(text) else {
        return false;
    };

    tracing::info!("Click id found in WhatsApp message: {}", click_id);

    state.forwarder.forward(ForwardedConversion {
        click_id: click_id.to_string(),
        phone: message.from.clone(),
        message: text.to_string(),
        received_at: message.received_at().unwrap_or_else(chrono::Utc::now),
    });

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(mode: &str, token: &str) -> HubVerification {
        HubVerification {
            mode: Some(mode.to_string()),
            verify_token: Some(token.to_string()),
            challenge: Some("12345".to_string()),
        }
    }

    fn config_with_token(token: Option<&str>) -> Config {
        Config {
            whatsapp_verify_token: token.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_extract_click_id() {
        assert_eq!(extract_click_id("Hello click_id=abc123 thanks"), Some("abc123"));
        assert_eq!(extract_click_id("ref click_id:xyz&foo=bar"), Some("xyz"));
        assert_eq!(extract_click_id("no marker here"), None);
        assert_eq!(extract_click_id("click_id= abc"), None);
    }

    #[test]
    fn test_verify_subscription() {
        let config = config_with_token(Some("secret"));
        assert!(verify_subscription(&config, &hub("subscribe", "secret")).is_ok());
        assert!(verify_subscription(&config, &hub("subscribe", "wrong")).is_err());
        assert!(verify_subscription(&config, &hub("unsubscribe", "secret")).is_err());
    }

    #[test]
    fn test_verify_without_configured_token_fails() {
        let config = config_with_token(None);
        assert!(matches!(
            verify_subscription(&config, &hub("subscribe", "")),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_handshake_returns_challenge() {
        let config = config_with_token(Some("secret"));
        assert_eq!(
            handshake(&config, &hub("subscribe", "secret")).ok().as_deref(),
            Some("12345")
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
