//! Clinic click attribution service
//!
//! Carries ad-click attribution from the landing pages into WhatsApp
//! conversations and reports the resulting conversions back to the ad
//! platforms.
//!
//! # Modules
//!
//! - `api`: HTTP-facing handlers and routing.
//! - `core`: Attribution, link building and client-side tracking.
//! - `integrations`: Third-party webhooks and conversion delivery.
//! - `attribution`: Attribution parameter extraction.
//! - `config`: Configuration management.
//! - `conversion_forwarder`: GA4 and Meta Conversions API delivery.
//! - `crm_webhook_handler`: GoHighLevel conversion webhook.
//! - `errors`: Error handling types.
//! - `handlers`: Shared state, health check and landing pages.
//! - `layout`: Page layout, tracking head and templates.
//! - `redirect_handler`: WhatsApp redirect bridge.
//! - `routes`: Router assembly and OpenAPI document.
//! - `tracking`: Conversion events and the page tracking script.
//! - `webhook_models`: Webhook payload models.
//! - `whatsapp_link`: `wa.me` link builder.
//! - `whatsapp_webhook_handler`: WhatsApp Cloud webhook.

pub mod api;
pub mod core;
pub mod integrations;

pub mod attribution;
pub mod config;
pub mod conversion_forwarder;
pub mod crm_webhook_handler;
pub mod errors;
pub mod handlers;
pub mod layout;
pub mod redirect_handler;
pub mod routes;
pub mod tracking;
pub mod webhook_models;
pub mod whatsapp_link;
pub mod whatsapp_webhook_handler;
