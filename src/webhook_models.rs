use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Accepts any JSON scalar as a string; objects, arrays and null become `None`.
///
/// Third-party payloads are loosely typed (ids arrive as numbers or strings
/// depending on the integration), so recognized fields never fail parsing.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Any JSON value for nested blocks; a block of the wrong shape is treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

// ---------------------------------------------------------------------------
// CRM (GoHighLevel) events
// ---------------------------------------------------------------------------

/// Event posted by the CRM when something happens on a contact.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrmEvent {
    /// Event discriminator, e.g. "message_sent".
    #[serde(default, deserialize_with = "lenient_string")]
    pub event: Option<String>,

    /// Channel the event happened on, e.g. "whatsapp".
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,

    /// Contact custom fields; `gclid` is stored there when the lead came from an ad.
    #[serde(default, deserialize_with = "lenient")]
    pub custom_fields: Option<CrmCustomFields>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CrmCustomFields {
    #[serde(default, deserialize_with = "lenient_string")]
    pub gclid: Option<String>,
}

impl CrmEvent {
    pub const MESSAGE_SENT: &'static str = "message_sent";
    pub const WHATSAPP_CHANNEL: &'static str = "whatsapp";

    /// Reads the recognized fields out of an arbitrary JSON body. Non-object
    /// bodies yield an event with nothing set.
    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Only WhatsApp "message sent" events are reported as conversions.
    pub fn is_whatsapp_message_sent(&self) -> bool {
        self.event.as_deref() == Some(Self::MESSAGE_SENT)
            && self.channel.as_deref() == Some(Self::WHATSAPP_CHANNEL)
    }

    pub fn gclid(&self) -> Option<&str> {
        self.custom_fields
            .as_ref()
            .and_then(|fields| fields.gclid.as_deref())
            .filter(|gclid| !gclid.is_empty())
    }
}

/// Generic acknowledgment for events that are not reported.
#[derive(Debug, Serialize, ToSchema)]
pub struct CrmAckResponse {
    pub status: String,
    pub message: String,
}

/// Liveness probe body for `GET /ghl-conversion`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CrmStatusResponse {
    pub status: String,
    /// RFC 3339 timestamp of the probe.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// WhatsApp Cloud platform webhooks
// ---------------------------------------------------------------------------

/// Subscription handshake. Arrives as `hub.*` query parameters on GET, or as
/// a `hub` object in a POST body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HubVerification {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub verify_token: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
}

impl HubVerification {
    /// Reads `hub.mode`, `hub.verify_token` and `hub.challenge` from query
    /// pairs. The first occurrence of each wins; anything else is ignored.
    pub fn from_query(query: &[(String, String)]) -> Self {
        let first = |name: &str| {
            query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        Self {
            mode: first("hub.mode"),
            verify_token: first("hub.verify_token"),
            challenge: first("hub.challenge"),
        }
    }
}

/// Envelope of a WhatsApp Cloud webhook delivery.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppWebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,

    /// Handshake embedded in a POST body instead of the query string.
    #[serde(default)]
    pub hub: Option<HubVerification>,

    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<WhatsAppChangeValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub messages: Vec<WhatsAppInboundMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppInboundMessage {
    #[serde(default)]
    pub id: Option<String>,
    /// Sender phone in international format without `+`.
    #[serde(default)]
    pub from: Option<String>,
    /// Unix seconds, as a string.
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub text: Option<WhatsAppText>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhatsAppText {
    #[serde(default)]
    pub body: String,
}

impl WhatsAppWebhookEnvelope {
    /// All inbound messages across every entry and change.
    pub fn messages(&self) -> impl Iterator<Item = &WhatsAppInboundMessage> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .filter_map(|change| change.value.as_ref())
            .flat_map(|value| value.messages.iter())
    }
}

impl WhatsAppInboundMessage {
    pub fn body(&self) -> &str {
        self.text.as_ref().map(|t| t.body.as_str()).unwrap_or("")
    }

    pub fn received_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| ts.trim().parse::<i64>().ok())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    }
}

/// Response sent back to the WhatsApp platform after an event delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAckResponse {
    pub status: String,
}
