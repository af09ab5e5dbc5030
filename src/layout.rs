//! Page layout shared by every HTML response.
//!
//! One layout, configured once at startup, decides which tracking snippets
//! (Google tag, the `gtag_report_conversion` helper, Meta Pixel) and which
//! web font end up in the `<head>`.

use minijinja::{context, Environment, Value};
use std::fmt::Write as _;

use crate::errors::AppError;
use crate::tracking::js_literal;

/// Grace period before the conversion helper navigates without the Ads callback.
const CONVERSION_CALLBACK_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct FontConfig {
    pub family: String,
    pub stylesheet_url: String,
}

impl FontConfig {
    /// A Google Fonts family with the weights the pages use.
    pub fn google(family: String) -> Self {
        let stylesheet_url = format!(
            "https://fonts.googleapis.com/css2?family={}:wght@300;400;500;600;700;800&display=swap",
            family.trim().replace(' ', "+")
        );
        Self {
            family,
            stylesheet_url,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self::google("Cairo".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub enable_ads_pixel: bool,
    pub enable_meta_pixel: bool,
    pub ads_conversion_id: String,
    pub analytics_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
    pub font: FontConfig,
}

impl LayoutConfig {
    /// Same layout with the Ads tag forced on, for pages whose only job is
    /// to fire an Ads conversion.
    pub fn with_ads_pixel(&self) -> Self {
        Self {
            enable_ads_pixel: true,
            ..self.clone()
        }
    }

    /// Google tag ids to `config`, Ads first.
    fn gtag_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        if self.enable_ads_pixel {
            ids.push(self.ads_conversion_id.as_str());
        }
        if let Some(id) = self.analytics_measurement_id.as_deref() {
            ids.push(id);
        }
        ids
    }

    /// Renders the tracking `<script>` tags for the `<head>`.
    ///
    /// `send_to` is the Ads conversion target used by `gtag_report_conversion`.
    pub fn tracking_head(&self, send_to: &str) -> String {
        let mut html = String::new();

        let ids = self.gtag_ids();
        if let Some(loader_id) = ids.first() {
            let _ = writeln!(
                html,
                "<script async src=\"https://www.googletagmanager.com/gtag/js?id={}\"></script>",
                urlencoding::encode(loader_id)
            );
            html.push_str("<script>\n  window.dataLayer = window.dataLayer || [];\n  function gtag(){dataLayer.push(arguments);}\n  gtag('js', new Date());\n");
            for id in &ids {
                let _ = writeln!(html, "  gtag('config', {});", js_literal(id));
            }
            html.push_str("</script>\n");
        }

        if self.enable_ads_pixel {
            let _ = write!(
                html,
                "<script>\n  function gtag_report_conversion(url) {{\n    var done = false;\n    var callback = function () {{\n      if (done || typeof url === 'undefined') {{ return; }}\n      done = true;\n      window.location = url;\n    }};\n    gtag('event', 'conversion', {{ 'send_to': {}, 'event_callback': callback }});\n    if (typeof url !== 'undefined') {{ setTimeout(callback, {}); }}\n    return false;\n  }}\n</script>\n",
                js_literal(send_to),
                CONVERSION_CALLBACK_TIMEOUT_MS
            );
        }

        if let (true, Some(pixel_id)) = (self.enable_meta_pixel, self.meta_pixel_id.as_deref()) {
            let _ = write!(
                html,
                "<script>\n  !function(f,b,e,v,n,t,s)\n  {{if(f.fbq)return;n=f.fbq=function(){{n.callMethod?\n  n.callMethod.apply(n,arguments):n.queue.push(arguments)}};\n  if(!f._fbq)f._fbq=n;n.push=n;n.loaded=!0;n.version='2.0';\n  n.queue=[];t=b.createElement(e);t.async=!0;\n  t.src=v;s=b.getElementsByTagName(e)[0];\n  s.parentNode.insertBefore(t,s)}}(window, document,'script',\n  'https://connect.facebook.net/en_US/fbevents.js');\n  fbq('init', {});\n  fbq('track', 'PageView');\n</script>\n",
                js_literal(pixel_id)
            );
        }

        html
    }

    /// Template context for the shared `<head>`.
    pub fn head(&self, send_to: &str) -> Value {
        context! {
            font_family => &self.font.family,
            font_stylesheet => &self.font.stylesheet_url,
            tracking => Value::from_safe_string(self.tracking_head(send_to)),
        }
    }
}

/// Compiled page templates.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn load() -> Result<Self, AppError> {
        let mut env = Environment::new();
        env.add_template("layout.html", include_str!("../templates/layout.html"))?;
        env.add_template("landing.html", include_str!("../templates/landing.html"))?;
        env.add_template(
            "hollywood_smile.html",
            include_str!("../templates/hollywood_smile.html"),
        )?;
        env.add_template("redirect.html", include_str!("../templates/redirect.html"))?;
        env.add_template(
            "conversion.html",
            include_str!("../templates/conversion.html"),
        )?;
        Ok(Self { env })
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<String, AppError> {
        let template = self.env.get_template(name)?;
        Ok(template.render(ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LayoutConfig {
        LayoutConfig {
            enable_ads_pixel: true,
            enable_meta_pixel: false,
            ads_conversion_id: "AW-1".to_string(),
            analytics_measurement_id: None,
            meta_pixel_id: None,
            font: FontConfig::default(),
        }
    }

    #[test]
    fn test_ads_only_head() {
        let head = layout().tracking_head("AW-1/abc");
        assert!(head.contains("gtag/js?id=AW-1"));
        assert!(head.contains("gtag('config', \"AW-1\");"));
        assert!(head.contains("function gtag_report_conversion(url)"));
        assert!(head.contains("'send_to': \"AW-1/abc\""));
        assert!(!head.contains("fbevents.js"));
    }

    #[test]
    fn test_meta_only_head() {
        let config = LayoutConfig {
            enable_ads_pixel: false,
            enable_meta_pixel: true,
            meta_pixel_id: Some("999".to_string()),
            ..layout()
        };
        let head = config.tracking_head("AW-1/abc");
        assert!(!head.contains("googletagmanager"));
        assert!(!head.contains("gtag_report_conversion"));
        assert!(head.contains("fbq('init', \"999\");"));
    }

    #[test]
    fn test_analytics_without_ads_still_loads_gtag() {
        let config = LayoutConfig {
            enable_ads_pixel: false,
            analytics_measurement_id: Some("G-XYZ".to_string()),
            ..layout()
        };
        let head = config.tracking_head("AW-1/abc");
        assert!(head.contains("gtag/js?id=G-XYZ"));
        assert!(!head.contains("gtag_report_conversion"));
    }

    #[test]
    fn test_font_stylesheet_url() {
        let font = FontConfig::google("Noto Kufi Arabic".to_string());
        assert!(font
            .stylesheet_url
            .contains("family=Noto+Kufi+Arabic:wght@300"));
    }

    #[test]
    fn test_templates_compile() {
        assert!(Templates::load().is_ok());
    }
}
