use crate::attribution::AttributionParameters;
use crate::errors::AppError;

const WHATSAPP_BASE_URL: &str = "https://wa.me";

/// A pre-filled WhatsApp message plus the attribution it should carry.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub attribution: AttributionParameters,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>, attribution: AttributionParameters) -> Self {
        Self {
            text: text.into(),
            attribution,
        }
    }
}

/// Builds `wa.me` deep links for the clinic number.
#[derive(Debug, Clone)]
pub struct WhatsAppLinkBuilder {
    phone: String,
}

impl WhatsAppLinkBuilder {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
        }
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Builds `https://wa.me/<phone>?text=<message>&<attribution...>`.
    ///
    /// Attribution parameters follow `text` in [`AttributionKey`] order and
    /// absent keys are left out entirely. An empty message is rejected.
    ///
    /// [`AttributionKey`]: crate::attribution::AttributionKey
    pub fn build(&self, message: &OutboundMessage) -> Result<String, AppError> {
        if message.text.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Message parameter is required".to_string(),
            ));
        }

        let mut params = Vec::with_capacity(1 + message.attribution.len());
        params.push(format!("text={}", urlencoding::encode(&message.text)));
        for (key, value) in message.attribution.iter() {
            params.push(format!("{}={}", key, urlencoding::encode(value)));
        }

        Ok(format!(
            "{}/{}?{}",
            WHATSAPP_BASE_URL,
            self.phone,
            params.join("&")
        ))
    }
}
