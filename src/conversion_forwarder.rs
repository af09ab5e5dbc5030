//! Server-side delivery of "message sent" conversions.
//!
//! When a WhatsApp message arrives carrying a click id, the conversion is
//! reported to the GA4 Measurement Protocol and the Meta Conversions API.
//! Each destination is used only when its credentials are configured; with
//! neither configured the conversion is only logged.
//!
//! Delivery is a single attempt on a detached task. Failures are logged and
//! dropped so a slow third party never holds up the webhook response.

use crate::config::ForwardingConfig;
use crate::errors::{AppError, ResultExt};
use chrono::{DateTime, Utc};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Event name reported to GA4.
pub const GA4_EVENT_NAME: &str = "whatsapp_message_sent";

/// A conversion recovered from an inbound WhatsApp message.
#[derive(Debug, Clone)]
pub struct ForwardedConversion {
    pub click_id: String,
    pub phone: Option<String>,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Ga4Credentials {
    measurement_id: String,
    api_secret: String,
}

#[derive(Debug, Clone)]
struct MetaCredentials {
    pixel_id: String,
    access_token: String,
}

/// Outcome of one delivery round, per destination. `None` means not configured.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub ga4: Option<Result<(), AppError>>,
    pub meta: Option<Result<(), AppError>>,
}

#[derive(Clone)]
pub struct ConversionForwarder {
    client: Client,
    site_url: String,
    ga4_endpoint: String,
    graph_url: String,
    graph_version: String,
    ga4: Option<Ga4Credentials>,
    meta: Option<MetaCredentials>,
}

impl ConversionForwarder {
    pub fn new(config: &ForwardingConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create conversions client: {}", e))
            })?;

        let ga4 = match (&config.ga4_measurement_id, &config.ga4_api_secret) {
            (Some(measurement_id), Some(api_secret)) => Some(Ga4Credentials {
                measurement_id: measurement_id.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => None,
        };

        let meta = match (&config.facebook_pixel_id, &config.facebook_conversions_token) {
            (Some(pixel_id), Some(access_token)) => Some(MetaCredentials {
                pixel_id: pixel_id.clone(),
                access_token: access_token.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            site_url: config.site_url.clone(),
            ga4_endpoint: config.ga4_endpoint.clone(),
            graph_url: config.facebook_graph_url.clone(),
            graph_version: config.facebook_graph_version.clone(),
            ga4,
            meta,
        })
    }

    pub fn ga4_enabled(&self) -> bool {
        self.ga4.is_some()
    }

    pub fn meta_enabled(&self) -> bool {
        self.meta.is_some()
    }

    /// Hands the conversion to a detached task and returns immediately.
    pub fn forward(&self, conversion: ForwardedConversion) -> JoinHandle<()> {
        let forwarder = self.clone();
        tokio::spawn(async move {
            let report = forwarder.deliver(&conversion).await;
            if report.ga4.is_none() && report.meta.is_none() {
                tracing::info!(
                    "Message sent conversion tracked (log only): click_id={}, phone={}, message={}",
                    conversion.click_id,
                    conversion.phone.as_deref().unwrap_or("-"),
                    conversion.message
                );
            }
        })
    }

    /// Sends the conversion to every configured destination, one attempt each.
    pub async fn deliver(&self, conversion: &ForwardedConversion) -> DeliveryReport {
        let (ga4, meta) = tokio::join!(
            async {
                match self.ga4.as_ref() {
                    Some(creds) => Some(self.send_to_ga4(creds, conversion).await),
                    None => None,
                }
            },
            async {
                match self.meta.as_ref() {
                    Some(creds) => Some(self.send_to_meta(creds, conversion).await),
                    None => None,
                }
            }
        );

        if let Some(Err(e)) = &ga4 {
            tracing::warn!("GA4 conversion delivery failed: {}", e);
        }
        if let Some(Err(e)) = &meta {
            tracing::warn!("Meta conversion delivery failed: {}", e);
        }

        DeliveryReport { ga4, meta }
    }

    async fn send_to_ga4(
        &self,
        creds: &Ga4Credentials,
        conversion: &ForwardedConversion,
    ) -> Result<(), AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/mp/collect", self.ga4_endpoint),
            &[
                ("measurement_id", creds.measurement_id.as_str()),
                ("api_secret", creds.api_secret.as_str()),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build GA4 URL: {}", e)))?;

        tracing::debug!(
            "GA4 collect: {}/mp/collect?measurement_id={}&api_secret=[REDACTED]",
            self.ga4_endpoint,
            creds.measurement_id
        );

        let response = self
            .client
            .post(url)
            .json(&ga4_payload(&conversion.click_id))
            .send()
            .await
            .context("GA4 Measurement Protocol request")?;

        tracing::info!("GA4 tracking sent: {}", response.status());
        ensure_success(response, "GA4").await
    }

    async fn send_to_meta(
        &self,
        creds: &MetaCredentials,
        conversion: &ForwardedConversion,
    ) -> Result<(), AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!(
                "{}/{}/{}/events",
                self.graph_url, self.graph_version, creds.pixel_id
            ),
            &[("access_token", creds.access_token.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build Graph URL: {}", e)))?;

        let payload = meta_payload(conversion, &self.site_url, &Uuid::new_v4().to_string());

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("Meta Conversions API request")?;

        tracing::info!("Facebook Conversions API sent: {}", response.status());
        ensure_success(response, "Meta Conversions API").await
    }
}

async fn ensure_success(response: reqwest::Response, service: &str) -> Result<(), AppError> {
    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::ExternalApiError(format!(
        "{} returned {}: {}",
        service, status, error_text
    )))
}

/// GA4 Measurement Protocol body. The click id doubles as client and session id.
pub fn ga4_payload(click_id: &str) -> Value {
    json!({
        "client_id": click_id,
        "events": [{
            "name": GA4_EVENT_NAME,
            "params": {
                "engagement_time_msec": 1000,
                "session_id": click_id,
                "click_id": click_id
            }
        }]
    })
}

/// Meta Conversions API body for a WhatsApp "Contact" conversion, timed at
/// the moment the message reached WhatsApp.
pub fn meta_payload(conversion: &ForwardedConversion, site_url: &str, event_id: &str) -> Value {
    let mut user_data = serde_json::Map::new();
    if let Some(hashed) = conversion.phone.as_deref().and_then(hash_phone) {
        user_data.insert("ph".to_string(), Value::String(hashed));
    }

    json!({
        "data": [{
            "event_name": "Contact",
            "event_time": conversion.received_at.timestamp(),
            "event_id": event_id,
            "action_source": "website",
            "event_source_url": site_url,
            "user_data": user_data,
            "custom_data": {
                "click_id": conversion.click_id,
                "content_name": "WhatsApp Message Sent",
                "content_category": "Contact",
                "value": 1
            }
        }]
    })
}

/// Normalizes a phone number to E.164 digits (no `+`).
///
/// WhatsApp reports senders as international digits without the `+`; short
/// local numbers are read as Kuwaiti. Unparseable input falls back to its
/// digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let parsed = if raw.trim_start().starts_with('+') || digits.len() > 8 {
        phonenumber::parse(None, format!("+{}", digits))
    } else {
        phonenumber::parse(Some(CountryId::KW), &digits)
    };

    match parsed {
        Ok(number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            Some(formatted.trim_start_matches('+').to_string())
        }
        Err(e) => {
            tracing::debug!("Could not parse phone '{}': {:?}", raw, e);
            Some(digits)
        }
    }
}

/// SHA-256 hex of the normalized phone, as the Conversions API expects.
pub fn hash_phone(raw: &str) -> Option<String> {
    let normalized = normalize_phone(raw)?;
    Some(hex::encode(Sha256::digest(normalized.as_bytes())))
}
