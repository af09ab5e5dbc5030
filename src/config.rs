use crate::layout::{FontConfig, LayoutConfig};

/// Destination number for every outbound `wa.me` link.
pub const DEFAULT_WHATSAPP_PHONE: &str = "+96555200604";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Clinic WhatsApp number, including the leading `+`.
    pub whatsapp_phone: String,
    /// Shared secret for the WhatsApp Cloud subscription handshake.
    /// When unset every handshake is refused.
    pub whatsapp_verify_token: Option<String>,
    pub conversion: ConversionConfig,
    pub layout: LayoutConfig,
    pub forwarding: ForwardingConfig,
}

/// Google Ads conversion action fired by the CRM webhook page.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub ads_conversion_id: String,
    pub ads_conversion_label: String,
    pub value: f64,
    pub currency: String,
}

impl ConversionConfig {
    /// `send_to` target in the `AW-xxx/label` form gtag expects.
    pub fn send_to(&self) -> String {
        format!("{}/{}", self.ads_conversion_id, self.ads_conversion_label)
    }
}

/// Server-side conversion delivery (GA4 Measurement Protocol, Meta Conversions API).
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    pub site_url: String,
    pub ga4_endpoint: String,
    pub ga4_measurement_id: Option<String>,
    pub ga4_api_secret: Option<String>,
    pub facebook_graph_url: String,
    pub facebook_graph_version: String,
    pub facebook_pixel_id: Option<String>,
    pub facebook_conversions_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            whatsapp_phone: DEFAULT_WHATSAPP_PHONE.to_string(),
            whatsapp_verify_token: None,
            conversion: ConversionConfig {
                ads_conversion_id: "AW-17138098917".to_string(),
                ads_conversion_label: "c5lQCPSLiJsbEOXFiuw_".to_string(),
                value: 50.0,
                currency: "KWD".to_string(),
            },
            layout: LayoutConfig {
                enable_ads_pixel: true,
                enable_meta_pixel: false,
                ads_conversion_id: "AW-17138098917".to_string(),
                analytics_measurement_id: None,
                meta_pixel_id: None,
                font: FontConfig::default(),
            },
            forwarding: ForwardingConfig {
                site_url: "https://mdckuwait.com".to_string(),
                ga4_endpoint: "https://www.google-analytics.com".to_string(),
                ga4_measurement_id: None,
                ga4_api_secret: None,
                facebook_graph_url: "https://graph.facebook.com".to_string(),
                facebook_graph_version: "v18.0".to_string(),
                facebook_pixel_id: None,
                facebook_conversions_token: None,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Unset or blank variables fall back to the clinic defaults; malformed
    /// values fail with an error naming the variable.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let ads_conversion_id =
            var("GOOGLE_ADS_CONVERSION_ID").unwrap_or(defaults.conversion.ads_conversion_id);
        let meta_pixel_id = var("FACEBOOK_PIXEL_ID");

        let config = Self {
            port: var("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            whatsapp_phone: var("WHATSAPP_PHONE")
                .map(|phone| {
                    let digits = phone.trim_start_matches('+');
                    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                        anyhow::bail!("WHATSAPP_PHONE must contain only digits after an optional '+'");
                    }
                    Ok(phone)
                })
                .transpose()?
                .unwrap_or(defaults.whatsapp_phone),
            whatsapp_verify_token: var("WHATSAPP_WEBHOOK_VERIFY_TOKEN"),
            conversion: ConversionConfig {
                ads_conversion_id: ads_conversion_id.clone(),
                ads_conversion_label: var("GOOGLE_ADS_CONVERSION_LABEL")
                    .unwrap_or(defaults.conversion.ads_conversion_label),
                value: var("CONVERSION_VALUE")
                    .map(|v| {
                        v.parse::<f64>()
                            .map_err(|_| anyhow::anyhow!("CONVERSION_VALUE must be a number"))
                    })
                    .transpose()?
                    .unwrap_or(defaults.conversion.value),
                currency: var("CONVERSION_CURRENCY").unwrap_or(defaults.conversion.currency),
            },
            layout: LayoutConfig {
                enable_ads_pixel: parse_flag(var("ENABLE_ADS_PIXEL"), "ENABLE_ADS_PIXEL")?
                    .unwrap_or(true),
                enable_meta_pixel: parse_flag(var("ENABLE_META_PIXEL"), "ENABLE_META_PIXEL")?
                    .unwrap_or(meta_pixel_id.is_some()),
                ads_conversion_id,
                analytics_measurement_id: var("GA_MEASUREMENT_ID"),
                meta_pixel_id: meta_pixel_id.clone(),
                font: var("SITE_FONT_FAMILY")
                    .map(FontConfig::google)
                    .unwrap_or_default(),
            },
            forwarding: ForwardingConfig {
                site_url: http_url(var("SITE_URL"), "SITE_URL")?
                    .unwrap_or(defaults.forwarding.site_url),
                ga4_endpoint: http_url(var("GA4_ENDPOINT"), "GA4_ENDPOINT")?
                    .unwrap_or(defaults.forwarding.ga4_endpoint),
                ga4_measurement_id: var("GA4_MEASUREMENT_ID"),
                ga4_api_secret: var("GA4_API_SECRET"),
                facebook_graph_url: http_url(var("FACEBOOK_GRAPH_URL"), "FACEBOOK_GRAPH_URL")?
                    .unwrap_or(defaults.forwarding.facebook_graph_url),
                facebook_graph_version: var("FACEBOOK_GRAPH_VERSION")
                    .unwrap_or(defaults.forwarding.facebook_graph_version),
                facebook_pixel_id: meta_pixel_id,
                facebook_conversions_token: var("FACEBOOK_CONVERSIONS_API_TOKEN"),
            },
        };

        if config.layout.enable_meta_pixel && config.layout.meta_pixel_id.is_none() {
            anyhow::bail!("ENABLE_META_PIXEL requires FACEBOOK_PIXEL_ID");
        }

        // Log successful configuration load (without sensitive values)
        tracing::debug!("WhatsApp destination: {}", config.whatsapp_phone);
        tracing::debug!(
            "Ads pixel: {}, Meta pixel: {}",
            config.layout.enable_ads_pixel,
            config.layout.enable_meta_pixel
        );
        if config.whatsapp_verify_token.is_none() {
            tracing::warn!(
                "WHATSAPP_WEBHOOK_VERIFY_TOKEN not set - webhook verification will always fail"
            );
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn parse_flag(value: Option<String>, name: &str) -> anyhow::Result<Option<bool>> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow::anyhow!("{} must be a boolean (true/false)", name)),
        })
        .transpose()
}

fn http_url(value: Option<String>, name: &str) -> anyhow::Result<Option<String>> {
    value
        .map(|url| {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
            Ok(url.trim_end_matches('/').to_string())
        })
        .transpose()
}
