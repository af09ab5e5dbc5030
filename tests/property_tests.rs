/// Property-based tests using proptest
/// Tests invariants of attribution extraction and link building for all inputs
use clinic_attribution::core::attribution::{AttributionKey, AttributionParameters};
use clinic_attribution::core::whatsapp_link::{OutboundMessage, WhatsAppLinkBuilder};
use clinic_attribution::integrations::webhook_models::CrmEvent;
use clinic_attribution::whatsapp_webhook_handler::extract_click_id;
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = AttributionKey> {
    prop::sample::select(AttributionKey::ALL.to_vec())
}

fn query_names(link: &str) -> Vec<String> {
    let query = link.split_once('?').map(|(_, q)| q).unwrap_or_default();
    query
        .split('&')
        .map(|pair| pair.split_once('=').map(|(k, _)| k).unwrap_or(pair).to_string())
        .collect()
}

// Property: attribution extraction never panics on arbitrary URLs
proptest! {
    #[test]
    fn from_url_never_panics(raw in "\\PC*") {
        let _ = AttributionParameters::from_url(&raw);
    }

    #[test]
    fn crm_event_parsing_never_panics(raw in "\\PC*") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            let _ = CrmEvent::from_value(value);
        }
    }
}

// Property: links keep the fixed key order and omit absent keys
proptest! {
    #[test]
    fn link_params_follow_fixed_order(
        entries in prop::collection::vec((key_strategy(), "[A-Za-z0-9 _.-]{0,12}"), 0..12),
        message in "[^\\s].{0,40}"
    ) {
        let mut attribution = AttributionParameters::default();
        for (key, value) in &entries {
            attribution = attribution.with(*key, value.clone());
        }

        let link = WhatsAppLinkBuilder::new("+96555200604")
            .build(&OutboundMessage::new(message, attribution.clone()))
            .unwrap();

        prop_assert!(link.starts_with("https://wa.me/+96555200604?text="));

        let names = query_names(&link);
        prop_assert_eq!(&names[0], "text");

        let expected: Vec<String> = AttributionKey::ALL
            .iter()
            .filter(|key| attribution.get(**key).is_some())
            .map(|key| key.as_str().to_string())
            .collect();
        prop_assert_eq!(&names[1..], &expected[..]);

        // No empty-valued parameters
        for pair in link.split_once('?').unwrap().1.split('&') {
            prop_assert!(!pair.ends_with('='));
        }
    }

    #[test]
    fn blank_messages_are_rejected(message in "[ \\t\\n]{0,8}") {
        let result = WhatsAppLinkBuilder::new("+96555200604")
            .build(&OutboundMessage::new(message, AttributionParameters::default()));
        prop_assert!(result.is_err());
    }
}

// Property: a click id marker is always recovered from message text
proptest! {
    #[test]
    fn click_id_marker_round_trips(
        prefix in "[A-Za-z ]{0,20}",
        click_id in "[A-Za-z0-9_-]{1,24}",
        sep in prop::sample::select(vec!['=', ':'])
    ) {
        let text = format!("{} click_id{}{} thanks", prefix, sep, click_id);
        prop_assert_eq!(extract_click_id(&text), Some(click_id.as_str()));
    }
}
