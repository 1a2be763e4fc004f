/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use growth_audit::models::{normalize_company_payload, UrlParams};
use growth_audit::sequencer::{Sequencer, StepSequence, StepView};
use growth_audit::url_params::merge;
use growth_audit::validation::{
    format_revenue, is_valid_email, normalize_website_url, parse_revenue_input, parse_team_size,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn answer(key: &str, value: u32) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), json!(value));
    map
}

// Property: sequencer index arithmetic
proptest! {
    #[test]
    fn n_advances_land_on_index_n(n in 0usize..=12) {
        let mut sequencer = Sequencer::new(StepSequence::default_sequence());
        for i in 0..n {
            sequencer.advance(answer(&format!("k{}", i), i as u32));
        }
        prop_assert_eq!(sequencer.index(), n);
        prop_assert_eq!(sequencer.answers().len(), n);
    }

    #[test]
    fn index_never_exceeds_length(n in 0usize..50) {
        let mut sequencer = Sequencer::new(StepSequence::default_sequence());
        for _ in 0..n {
            sequencer.advance(Map::new());
        }
        prop_assert!(sequencer.index() <= sequencer.sequence().len());
        if n >= 12 {
            prop_assert_eq!(sequencer.current(), StepView::Complete);
        }
    }

    #[test]
    fn later_writes_to_a_key_win(values in proptest::collection::vec(any::<u32>(), 1..10)) {
        let mut sequencer = Sequencer::new(StepSequence::extended());
        for v in &values {
            sequencer.advance(answer("monthlyRevenue", *v));
        }
        prop_assert_eq!(&sequencer.answers()["monthlyRevenue"], &json!(values[values.len() - 1]));
    }

    #[test]
    fn retreat_undoes_advance(start in 0usize..12) {
        let mut sequencer = Sequencer::new(StepSequence::default_sequence());
        sequencer.jump_to(start);
        sequencer.advance(Map::new());
        sequencer.retreat();
        prop_assert_eq!(sequencer.index(), start);
    }

    #[test]
    fn retreat_at_zero_is_idempotent(times in 1usize..10) {
        let mut sequencer = Sequencer::new(StepSequence::default_sequence());
        for _ in 0..times {
            sequencer.retreat();
        }
        prop_assert_eq!(sequencer.index(), 0);
        prop_assert!(sequencer.answers().is_empty());
    }

    #[test]
    fn jump_to_is_clamped(target in any::<usize>()) {
        let mut sequencer = Sequencer::new(StepSequence::default_sequence());
        sequencer.jump_to(target);
        prop_assert!(sequencer.index() <= 11);
    }
}

// Property: validation and formatting never panic and keep their contracts
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn well_formed_emails_pass(
        local in "[a-z0-9._]{1,12}",
        domain in "[a-z]{1,10}",
        tld in "[a-z]{2,4}"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        prop_assert!(is_valid_email(&email));
    }

    #[test]
    fn website_normalization_is_idempotent(host in "[a-z]{1,12}\\.(com|com\\.br|io)") {
        let once = normalize_website_url(&host);
        prop_assert!(once.starts_with("https://"));
        prop_assert_eq!(normalize_website_url(&once), once);
    }

    #[test]
    fn revenue_parse_never_panics(input in "\\PC*") {
        let _ = parse_revenue_input(&input);
        let _ = parse_team_size(&input);
    }

    #[test]
    fn integer_revenue_round_trips(amount in 0u64..1_000_000_000_000) {
        prop_assert_eq!(parse_revenue_input(&amount.to_string()), amount);
        prop_assert_eq!(parse_revenue_input(&format!("R$ {}", amount)), amount);
    }

    #[test]
    fn small_revenue_is_printed_literally(amount in 1u64..1000) {
        prop_assert_eq!(format_revenue(amount), amount.to_string());
    }

    #[test]
    fn large_revenue_uses_a_suffix(amount in 1_000u64..u64::MAX) {
        let label = format_revenue(amount);
        prop_assert!(label.ends_with('K') || label.ends_with('M') || label.ends_with('B'));
    }
}

// Property: merging and payload normalization
proptest! {
    #[test]
    fn current_params_always_win(
        key in "[a-z_]{1,10}",
        stored_value in "[a-z0-9]{1,8}",
        current_value in "[a-z0-9]{1,8}"
    ) {
        let mut stored = UrlParams::new();
        stored.insert(key.clone(), stored_value);
        stored.insert("gclid".to_string(), "kept".to_string());
        let mut current = UrlParams::new();
        current.insert(key.clone(), current_value.clone());

        let merged = merge(&stored, &current);
        prop_assert_eq!(&merged[&key], &current_value);
        prop_assert!(merged.contains_key("gclid"));
    }

    #[test]
    fn niche_typo_never_survives_when_niche_missing(niche in "[A-Za-z ]{1,20}") {
        let normalized = normalize_company_payload(json!({ "nihce": niche.clone() }));
        prop_assert_eq!(&normalized["niche"], &json!(niche));
        prop_assert!(normalized.get("nihce").is_none());
    }
}
