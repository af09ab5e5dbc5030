use crate::handlers::{self, AppState};
use crate::webhook_models::{CrmAckResponse, CrmStatusResponse, WebhookAckResponse};
use crate::{crm_webhook_handler, redirect_handler, whatsapp_webhook_handler};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        redirect_handler::whatsapp_redirect,
        crm_webhook_handler::ghl_conversion,
        crm_webhook_handler::ghl_conversion_status,
        whatsapp_webhook_handler::verify_webhook,
        whatsapp_webhook_handler::receive_webhook,
    ),
    components(schemas(CrmAckResponse, CrmStatusResponse, WebhookAckResponse)),
    tags((name = "clinic-attribution", description = "WhatsApp click attribution and conversion webhooks"))
)]
pub struct ApiDoc;

/// Routes that take third-party traffic: the redirect bridge and both webhooks.
///
/// The binary wraps these in the per-IP rate limiter.
pub fn integration_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/whatsapp-redirect",
            get(redirect_handler::whatsapp_redirect),
        )
        .route(
            "/ghl-conversion",
            get(crm_webhook_handler::ghl_conversion_status)
                .post(crm_webhook_handler::ghl_conversion),
        )
        .route(
            "/whatsapp-webhook",
            get(whatsapp_webhook_handler::verify_webhook)
                .post(whatsapp_webhook_handler::receive_webhook),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Health check, marketing pages and API docs. Never rate limited.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::landing_page))
        .route("/holywoodsmile", get(handlers::hollywood_smile_page))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Full application router without the rate limiter.
pub fn build_router(state: Arc<AppState>) -> Router {
    public_routes()
        .merge(integration_routes())
        .with_state(state)
}
