/// Endpoint tests driving the full router in-process
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use clinic_attribution::api::routes::build_router;
use clinic_attribution::config::{Config, DEFAULT_WHATSAPP_PHONE};
use clinic_attribution::core::attribution::AttributionParameters;
use clinic_attribution::core::whatsapp_link::{OutboundMessage, WhatsAppLinkBuilder};
use clinic_attribution::handlers::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> Router {
    let config = Config {
        whatsapp_verify_token: Some("secret".to_string()),
        ..Config::default()
    };
    build_router(Arc::new(AppState::new(config).unwrap()))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, String) {
    call_raw(app, method, uri, body.map(|b| b.as_bytes().to_vec())).await
}

async fn call_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Vec<u8>>,
) -> (StatusCode, String) {
    let mut req = Request::builder().method(method).uri(uri);
    if body.is_some() {
        req = req.header(header::CONTENT_TYPE, "application/json");
    }
    let req = req
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Undoes the HTML attribute escaping applied by the templates.
fn html_unescape(value: &str) -> String {
    value
        .replace("&#x2f;", "/")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// The `href` of the interstitial's manual fallback link.
fn manual_link_href(body: &str) -> String {
    let tag_end = body
        .find("\" class=\"whatsapp-button\" id=\"manual-link\"")
        .expect("manual link rendered");
    let start = body[..tag_end].rfind("<a href=\"").expect("anchor start") + "<a href=\"".len();
    html_unescape(&body[start..tag_end])
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, body) = call(&test_app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn redirect_requires_message() {
    let app = test_app();

    let (status, body) = call(&app, Method::GET, "/whatsapp-redirect?click_id=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Message parameter is required");

    let (status, _) = call(&app, Method::GET, "/whatsapp-redirect?message=%20%20", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redirect_renders_interstitial_with_attributed_link() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/whatsapp-redirect?message=%D9%85%D8%B1%D8%AD%D8%A8%D8%A7&click_id=abc123&gclid=Cj0&utm_source=google",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(
        "window.location.href = \"https://wa.me/+96555200604?text=%D9%85%D8%B1%D8%AD%D8%A8%D8%A7&utm_source=google&gclid=Cj0&click_id=abc123\";"
    ));
    assert!(body.contains("}, 2000));"));

    let expected = WhatsAppLinkBuilder::new(DEFAULT_WHATSAPP_PHONE)
        .build(&OutboundMessage::new(
            "مرحبا",
            AttributionParameters::from_pairs([
                ("click_id", "abc123"),
                ("gclid", "Cj0"),
                ("utm_source", "google"),
            ]),
        ))
        .unwrap();
    assert_eq!(manual_link_href(&body), expected);
    assert!(body.contains("\"whatsapp_redirect_attempt\""));
    assert!(body.contains("'visibilitychange'"));
    assert!(body.contains("dir=\"rtl\""));
}

#[tokio::test]
async fn redirect_keeps_first_non_empty_repeated_parameter() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/whatsapp-redirect?message=hi&gclid=abc&gclid=&message=ignored",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        manual_link_href(&body),
        format!("https://wa.me/{}?text=hi&gclid=abc", DEFAULT_WHATSAPP_PHONE)
    );
}

#[tokio::test]
async fn redirect_escapes_markup_in_message() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/whatsapp-redirect?message=%3C%2Fscript%3E%3Cscript%3Ealert(1)%3C%2Fscript%3E",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("<script>alert(1)"));
}

#[tokio::test]
async fn whatsapp_verification_echoes_challenge() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/whatsapp-webhook?hub.mode=subscribe&hub.verify_token=secret&hub.challenge=12345",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "12345");
}

#[tokio::test]
async fn whatsapp_verification_rejects_wrong_token_without_echo() {
    let app = test_app();

    let (status, body) = call(
        &app,
        Method::GET,
        "/whatsapp-webhook?hub.mode=subscribe&hub.verify_token=guess&hub.challenge=12345",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.contains("12345"));
    assert!(!body.contains("guess"));
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Verification failed");

    let (status, _) = call(
        &app,
        Method::GET,
        "/whatsapp-webhook?hub.mode=unsubscribe&hub.verify_token=secret&hub.challenge=12345",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn whatsapp_verification_with_duplicate_keys_is_forbidden_json() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/whatsapp-webhook?hub.mode=subscribe&mode=subscribe&hub.verify_token=bad&hub.challenge=leak",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.contains("leak"));
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Verification failed");
}

#[tokio::test]
async fn whatsapp_handshake_in_post_body() {
    let app = test_app();
    let payload = json!({"hub": {"mode": "subscribe", "verify_token": "secret", "challenge": "777"}});
    let (status, body) = call(
        &app,
        Method::POST,
        "/whatsapp-webhook",
        Some(&payload.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "777");

    let payload = json!({"hub": {"mode": "subscribe", "verify_token": "nope", "challenge": "777"}});
    let (status, _) = call(
        &app,
        Method::POST,
        "/whatsapp-webhook",
        Some(&payload.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn whatsapp_events_are_acknowledged() {
    let payload = json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [
                        {"from": "96550000001", "timestamp": "1700000000", "type": "text",
                         "text": {"body": "مرحبا click_id=abc123"}},
                        {"from": "96550000002", "timestamp": "1700000001", "type": "text",
                         "text": {"body": "no marker"}}
                    ]
                }
            }]
        }]
    });

    let (status, body) = call(
        &test_app(),
        Method::POST,
        "/whatsapp-webhook",
        Some(&payload.to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, json!({"status": "success"}));
}

#[tokio::test]
async fn whatsapp_malformed_json_is_server_error() {
    let (status, body) = call(&test_app(), Method::POST, "/whatsapp-webhook", Some("{not json")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn crm_message_sent_renders_conversion_page() {
    let payload = json!({
        "event": "message_sent",
        "channel": "whatsapp",
        "contact_id": "c1",
        "phone": "+96550000001",
        "message": "hello",
        "custom_fields": {"gclid": "g1"}
    });
    let (status, body) = call(
        &test_app(),
        Method::POST,
        "/ghl-conversion",
        Some(&payload.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Conversion Tracked Successfully"));
    assert!(body.contains("\"transaction_id\":\"c1\""));
    assert!(body.contains("\"gclid\":\"g1\""));
    assert!(body.contains("\"send_to\":\"AW-17138098917/c5lQCPSLiJsbEOXFiuw_\""));
    assert!(body.contains("\"currency\":\"KWD\""));
}

#[tokio::test]
async fn crm_other_events_get_json_ack() {
    let payload = json!({"event": "contact_created", "channel": "whatsapp"});
    let (status, body) = call(
        &test_app(),
        Method::POST,
        "/ghl-conversion",
        Some(&payload.to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, json!({"status": "success", "message": "Event processed"}));
}

#[tokio::test]
async fn crm_malformed_json_is_server_error() {
    let (status, body) = call(&test_app(), Method::POST, "/ghl-conversion", Some("oops")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Internal server error");
}

#[tokio::test]
async fn webhooks_treat_non_utf8_body_as_server_error() {
    let app = test_app();

    for uri in ["/ghl-conversion", "/whatsapp-webhook"] {
        let (status, body) =
            call_raw(&app, Method::POST, uri, Some(vec![b'{', 0xff, 0xfe, b'}'])).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", uri);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}

#[tokio::test]
async fn crm_status_probe() {
    let (status, body) = call(&test_app(), Method::GET, "/ghl-conversion", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "GoHighLevel WhatsApp Conversion Webhook Active");
    assert!(chrono::DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn landing_links_carry_attribution() {
    let (status, body) = call(
        &test_app(),
        Method::GET,
        "/?utm_source=google&click_id=abc123&unknown=1",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("navigate(\"https://wa.me/+96555200604?text="));
    assert!(body.contains("&utm_source=google&click_id=abc123\")"));
    assert!(!body.contains("unknown=1"));
    assert!(body.contains("\"whatsapp_click\""));
}

#[tokio::test]
async fn hollywood_smile_page_renders() {
    let (status, body) = call(&test_app(), Method::GET, "/holywoodsmile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("whatsapp-cta-0"));
}

#[tokio::test]
async fn openapi_document_lists_endpoints() {
    let (status, body) = call(&test_app(), Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["paths"]["/whatsapp-redirect"].is_object());
    assert!(json["paths"]["/ghl-conversion"]["post"].is_object());
    assert!(json["paths"]["/whatsapp-webhook"]["get"].is_object());
}
