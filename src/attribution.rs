//! Campaign attribution parameters captured from inbound requests.
//!
//! Ad clicks land on the site carrying UTM tags and click identifiers
//! (`gclid`, `fbclid`, our own `click_id`). They are read once per request
//! and carried verbatim into every outbound WhatsApp link.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// The recognized attribution keys.
///
/// Variant order is the order parameters appear in outbound links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionKey {
    UtmSource,
    UtmCampaign,
    UtmMedium,
    UtmTerm,
    UtmContent,
    Gclid,
    Fbclid,
    ClickId,
}

impl AttributionKey {
    pub const ALL: [AttributionKey; 8] = [
        AttributionKey::UtmSource,
        AttributionKey::UtmCampaign,
        AttributionKey::UtmMedium,
        AttributionKey::UtmTerm,
        AttributionKey::UtmContent,
        AttributionKey::Gclid,
        AttributionKey::Fbclid,
        AttributionKey::ClickId,
    ];

    /// Query-string name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionKey::UtmSource => "utm_source",
            AttributionKey::UtmCampaign => "utm_campaign",
            AttributionKey::UtmMedium => "utm_medium",
            AttributionKey::UtmTerm => "utm_term",
            AttributionKey::UtmContent => "utm_content",
            AttributionKey::Gclid => "gclid",
            AttributionKey::Fbclid => "fbclid",
            AttributionKey::ClickId => "click_id",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for AttributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribution values present on a single request. Empty values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributionParameters {
    values: BTreeMap<AttributionKey, String>,
}

impl AttributionParameters {
    /// Extracts the recognized keys from decoded query pairs, in request order.
    pub fn from_query(query: &[(String, String)]) -> Self {
        Self::from_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Extracts the recognized keys from a page URL. An unparseable URL yields
    /// an empty set, the same as a URL without campaign tags.
    pub fn from_url(raw: &str) -> Self {
        match url::Url::parse(raw) {
            Ok(parsed) => {
                let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
                Self::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
            Err(e) => {
                tracing::debug!("Ignoring unparseable attribution URL '{}': {}", raw, e);
                Self::default()
            }
        }
    }

    /// Keeps the first non-empty value per recognized key; unknown keys are dropped.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut values = BTreeMap::new();
        for (name, value) in pairs {
            let Some(key) = AttributionKey::from_name(name) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            values.entry(key).or_insert_with(|| value.to_string());
        }
        Self { values }
    }

    /// Builder-style insert; an empty value removes nothing and is ignored.
    pub fn with(mut self, key: AttributionKey, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.values.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: AttributionKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn click_id(&self) -> Option<&str> {
        self.get(AttributionKey::ClickId)
    }

    /// Present parameters in link order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributionKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
