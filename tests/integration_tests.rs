// Integration tests for provider matching

use std::sync::Arc;

use proximity_dispatch::core::{distance::distance_km, LocationResolver, ProviderMatcher, RegionTable, PLACEHOLDER_COUNT};
use proximity_dispatch::models::{
    Coordinate, MatchCandidate, MatchOptions, MatchType, ProviderRecord, ProviderStatus, UserLocationContext,
};

const JAKARTA: Coordinate = Coordinate::new(-6.2088, 106.8456);

fn create_matcher() -> ProviderMatcher {
    let table = RegionTable::embedded().expect("embedded regions load");
    ProviderMatcher::new(Arc::new(LocationResolver::new(table)))
}

fn create_provider(
    id: &str,
    name: &str,
    region: Option<&str>,
    coordinate: Option<Coordinate>,
    status: ProviderStatus,
    active: bool,
) -> ProviderRecord {
    ProviderRecord {
        provider_id: id.to_string(),
        name: name.to_string(),
        region_id: region.map(str::to_string),
        coordinate,
        account_active: active,
        status,
    }
}

fn jakarta_user() -> UserLocationContext {
    UserLocationContext {
        region_id: Some("jakarta".to_string()),
        region_name: Some("Jakarta".to_string()),
        coordinate: Some(JAKARTA),
        raw_location_text: Some("Menteng, Jakarta".to_string()),
    }
}

fn ids(candidates: &[MatchCandidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.provider.provider_id.as_str()).collect()
}

/// Mixed snapshot covering every eligibility and tier outcome
fn mixed_snapshot() -> Vec<ProviderRecord> {
    vec![
        create_provider("a", "Ayu", None, Some(Coordinate::new(-6.2100, 106.8460)), ProviderStatus::Busy, true),
        create_provider("b", "Budi", None, Some(Coordinate::new(-6.2100, 106.8460)), ProviderStatus::Available, true),
        create_provider("c", "Citra", Some("jakarta"), None, ProviderStatus::Unknown, true),
        create_provider("d", "Dewi", Some("jakarta"), None, ProviderStatus::Available, true),
        create_provider("e", "Eka", Some("bandung"), Some(Coordinate::new(-6.9175, 107.6191)), ProviderStatus::Available, true),
        create_provider("f", "Fajar", Some("jakarta"), Some(JAKARTA), ProviderStatus::Offline, true),
        create_provider("g", "Gita", Some("jakarta"), Some(JAKARTA), ProviderStatus::Available, false),
        create_provider("h", "Hadi", None, None, ProviderStatus::Available, true),
        create_provider("a", "Ayu", None, Some(Coordinate::new(-6.2100, 106.8460)), ProviderStatus::Busy, true),
    ]
}

#[test]
fn test_jakarta_example_scenario() {
    let matcher = create_matcher();

    // Roughly 2 km, 50 km and 1 km south of the customer
    let p1 = create_provider("P1", "Putri", None, Some(Coordinate::new(-6.2268, 106.8456)), ProviderStatus::Available, true);
    let p2 = create_provider("P2", "Rina", Some("jakarta"), Some(Coordinate::new(-6.6585, 106.8456)), ProviderStatus::Busy, true);
    let p3 = create_provider("P3", "Sari", Some("jakarta"), Some(Coordinate::new(-6.2178, 106.8456)), ProviderStatus::Available, false);

    let outcome = matcher.match_providers(&[p1, p2, p3], &jakarta_user(), &MatchOptions::default());

    assert_eq!(ids(&outcome.distance_matches), vec!["P1"]);
    assert_eq!(ids(&outcome.region_matches), vec!["P2"]);
    assert_eq!(ids(&outcome.matches), vec!["P1", "P2"]);

    assert!(outcome.distance_matches[0].bookable);
    assert!(!outcome.region_matches[0].bookable);
    assert!(outcome.placeholders.is_empty());
    assert_eq!(outcome.stats.deactivated, 1);
}

#[test]
fn test_no_providers_yields_placeholders() {
    let matcher = create_matcher();

    let outcome = matcher.match_providers(&[], &jakarta_user(), &MatchOptions::default());

    assert_eq!(outcome.matches.len(), PLACEHOLDER_COUNT);
    assert_eq!(outcome.placeholders.len(), 5);
    for candidate in &outcome.matches {
        assert_eq!(candidate.match_type, MatchType::Placeholder);
        assert!(!candidate.bookable);
        assert!(candidate.note.as_deref().unwrap_or_default().contains("Jakarta"));
        assert!(candidate.provider.name.contains("Jakarta"));
    }
}

#[test]
fn test_missing_region_returns_empty_outcome() {
    let matcher = create_matcher();
    let user = UserLocationContext {
        region_id: Some("   ".to_string()),
        ..jakarta_user()
    };

    let outcome = matcher.match_providers(&mixed_snapshot(), &user, &MatchOptions::default());

    assert!(outcome.matches.is_empty());
    assert!(outcome.placeholders.is_empty());
    assert_eq!(outcome.stats.total_input, mixed_snapshot().len());
}

#[test]
fn test_matching_is_deterministic() {
    let matcher = create_matcher();
    let providers = mixed_snapshot();
    let options = MatchOptions::default();

    let first = matcher.match_providers(&providers, &jakarta_user(), &options);
    let second = matcher.match_providers(&providers, &jakarta_user(), &options);

    assert_eq!(first, second);
}

#[test]
fn test_tier_ordering_and_exclusivity() {
    let matcher = create_matcher();

    let outcome = matcher.match_providers(&mixed_snapshot(), &jakarta_user(), &MatchOptions::default());

    // Same distance: bookable Budi ahead of busy Ayu
    let distance_ids: Vec<&str> = outcome.distance_matches.iter().map(|c| c.provider.provider_id.as_str()).collect();
    assert_eq!(distance_ids, vec!["b", "a"]);

    // No coordinates: bookable Dewi ahead of soft-status Citra
    let region_ids: Vec<&str> = outcome.region_matches.iter().map(|c| c.provider.provider_id.as_str()).collect();
    assert_eq!(region_ids, vec!["d", "c"]);

    for candidate in &outcome.distance_matches {
        assert!(!region_ids.contains(&candidate.provider.provider_id.as_str()));
    }

    assert_eq!(outcome.stats.duplicates_skipped, 1);
    assert_eq!(outcome.stats.offline, 1);
    assert_eq!(outcome.stats.no_location, 1);
    assert_eq!(outcome.stats.soft_status, 1);
    assert_eq!(outcome.stats.unmatched, 1);
}

#[test]
fn test_deactivated_providers_never_appear() {
    let matcher = create_matcher();

    let outcome = matcher.match_providers(&mixed_snapshot(), &jakarta_user(), &MatchOptions::default());

    let all = outcome
        .matches
        .iter()
        .chain(&outcome.distance_matches)
        .chain(&outcome.region_matches);
    for candidate in all {
        assert!(candidate.provider.account_active);
        assert_ne!(candidate.provider.provider_id, "g");
    }
}

#[test]
fn test_radius_boundary_is_inclusive() {
    let matcher = create_matcher();
    let provider_location = Coordinate::new(-6.2500, 106.8800);
    let provider = create_provider("edge", "Edge", Some("bandung"), Some(provider_location), ProviderStatus::Available, true);
    let exact = distance_km(JAKARTA, provider_location);

    let at_radius = MatchOptions { radius_km: exact, ..MatchOptions::default() };
    let outcome = matcher.match_providers(std::slice::from_ref(&provider), &jakarta_user(), &at_radius);
    assert_eq!(outcome.distance_matches.len(), 1);

    let inside_boundary = MatchOptions { radius_km: exact - 1e-9, ..MatchOptions::default() };
    let outcome = matcher.match_providers(&[provider], &jakarta_user(), &inside_boundary);
    assert!(outcome.distance_matches.is_empty());
    assert_eq!(outcome.placeholders.len(), PLACEHOLDER_COUNT);
}

#[test]
fn test_placeholders_only_when_both_tiers_empty() {
    let matcher = create_matcher();
    let region_only = vec![create_provider("r", "Rina", Some("jakarta"), None, ProviderStatus::Busy, true)];

    let outcome = matcher.match_providers(&region_only, &jakarta_user(), &MatchOptions::default());

    assert!(outcome.placeholders.is_empty());
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].match_type, MatchType::Region);
}

#[test]
fn test_region_tier_fills_remaining_slots() {
    let matcher = create_matcher();
    let mut providers = vec![create_provider("near", "Near", None, Some(JAKARTA), ProviderStatus::Available, true)];
    providers.extend((0..4).map(|i| {
        create_provider(&format!("r{}", i), &format!("Region {}", i), Some("jakarta"), None, ProviderStatus::Busy, true)
    }));
    let options = MatchOptions {
        radius_km: 8.0,
        min_results: 3,
        max_results: 3,
    };

    let outcome = matcher.match_providers(&providers, &jakarta_user(), &options);

    assert_eq!(ids(&outcome.matches), vec!["near", "r0", "r1"]);
    assert_eq!(outcome.matches[0].match_type, MatchType::Distance);
    assert_eq!(outcome.region_matches.len(), 4);
}

#[test]
fn test_short_of_min_results_when_tiers_run_out() {
    let matcher = create_matcher();
    let providers = vec![
        create_provider("near", "Near", None, Some(JAKARTA), ProviderStatus::Available, true),
        create_provider("r0", "Region 0", Some("jakarta"), None, ProviderStatus::Busy, true),
    ];
    let options = MatchOptions {
        radius_km: 8.0,
        min_results: 5,
        max_results: 12,
    };

    let outcome = matcher.match_providers(&providers, &jakarta_user(), &options);

    // Every real candidate is listed and nothing synthetic pads the gap
    assert_eq!(ids(&outcome.matches), vec!["near", "r0"]);
    assert!(outcome.placeholders.is_empty());
}

#[test]
fn test_customer_without_coordinate_uses_region_only() {
    let matcher = create_matcher();
    let user = UserLocationContext {
        coordinate: None,
        ..jakarta_user()
    };

    let outcome = matcher.match_providers(&mixed_snapshot(), &user, &MatchOptions::default());

    assert!(outcome.distance_matches.is_empty());
    // Ayu and Budi have no region id and resolve to "jakarta" from their coordinate
    let region_ids: Vec<&str> = outcome.region_matches.iter().map(|c| c.provider.provider_id.as_str()).collect();
    assert_eq!(region_ids, vec!["b", "d", "a", "c"]);
}
