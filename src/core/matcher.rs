use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{
    distance::distance_km,
    filters::{evaluate_eligibility, Eligibility},
    ranking::{compare_distance_tier, compare_region_tier},
    regions::{LocationResolver, DEFAULT_PROVIDER_REGION_DISTANCE_KM, OTHER_REGION},
};
use crate::models::{
    MatchCandidate, MatchOptions, MatchOutcome, MatchStats, MatchType, ProviderRecord, ProviderStatus,
    UserLocationContext,
};

/// Number of synthetic candidates shown when a region has no providers
pub const PLACEHOLDER_COUNT: usize = 5;

/// Tiered provider matcher
///
/// # Pipeline Stages
/// 1. Deduplication by provider id
/// 2. Eligibility (deactivated, offline, no location)
/// 3. Distance tier: within `radius_km` of the customer
/// 4. Region tier: same region id as the customer
/// 5. Ordering, slot filling and placeholder fallback
///
/// Stateless apart from the read-only region table, so one instance can
/// serve concurrent requests.
#[derive(Debug, Clone)]
pub struct ProviderMatcher {
    resolver: Arc<LocationResolver>,
    provider_region_distance_km: f64,
}

impl ProviderMatcher {
    pub fn new(resolver: Arc<LocationResolver>) -> Self {
        Self {
            resolver,
            provider_region_distance_km: DEFAULT_PROVIDER_REGION_DISTANCE_KM,
        }
    }

    /// Override the radius used to derive a provider's region from its coordinate
    pub fn with_provider_region_distance(mut self, distance_km: f64) -> Self {
        self.provider_region_distance_km = distance_km;
        self
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Rank providers for a customer
    ///
    /// # Arguments
    /// * `providers` - Snapshot of provider records, possibly concatenated from several batches
    /// * `user` - The customer's location context
    /// * `options` - Radius and result-count bounds
    ///
    /// # Returns
    /// MatchOutcome with the combined list, both tiers, placeholders and counters.
    /// A customer without a region id yields an empty outcome and no placeholders.
    pub fn match_providers(
        &self,
        providers: &[ProviderRecord],
        user: &UserLocationContext,
        options: &MatchOptions,
    ) -> MatchOutcome {
        let mut stats = MatchStats {
            total_input: providers.len(),
            ..MatchStats::default()
        };

        let Some(user_region) = user.normalized_region_id() else {
            tracing::debug!("Skipping matching: request has no region id");
            return MatchOutcome {
                stats,
                ..MatchOutcome::default()
            };
        };

        let user_coordinate = user.coordinate.filter(|c| c.is_valid());
        let mut seen: HashSet<&str> = HashSet::with_capacity(providers.len());
        let mut distance_matches = Vec::new();
        let mut region_matches = Vec::new();

        for provider in providers {
            if !seen.insert(provider.provider_id.as_str()) {
                stats.duplicates_skipped += 1;
                continue;
            }
            stats.unique_providers += 1;

            match evaluate_eligibility(provider) {
                Eligibility::Deactivated => {
                    stats.deactivated += 1;
                    continue;
                }
                Eligibility::Offline => {
                    stats.offline += 1;
                    continue;
                }
                Eligibility::NoLocation => {
                    stats.no_location += 1;
                    continue;
                }
                Eligibility::SoftEligible => stats.soft_status += 1,
                Eligibility::Eligible => {}
            }

            let distance = user_coordinate
                .zip(provider.valid_coordinate())
                .map(|(from, to)| distance_km(from, to));

            if distance.is_some_and(|d| d <= options.radius_km) {
                distance_matches.push(MatchCandidate::new(provider.clone(), MatchType::Distance, distance));
                continue;
            }

            let provider_region = self.provider_region(provider);
            if provider_region != OTHER_REGION && provider_region == user_region {
                region_matches.push(MatchCandidate::new(provider.clone(), MatchType::Region, distance));
            } else {
                stats.unmatched += 1;
            }
        }

        distance_matches.sort_by(compare_distance_tier);
        region_matches.sort_by(compare_region_tier);
        stats.distance_matches = distance_matches.len();
        stats.region_matches = region_matches.len();

        let mut matches = combine_tiers(&distance_matches, &region_matches, options.max_results);
        if matches.len() < options.min_results {
            tracing::debug!(
                region = %user_region,
                found = matches.len(),
                min_results = options.min_results,
                "Both tiers exhausted below the requested minimum"
            );
        }

        let placeholders = if distance_matches.is_empty() && region_matches.is_empty() {
            let region_name = user
                .region_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map_or_else(|| self.resolver.display_name(&user_region), str::to_string);
            build_placeholders(&user_region, &region_name)
        } else {
            Vec::new()
        };
        if !placeholders.is_empty() {
            matches = placeholders.clone();
        }
        stats.placeholders = placeholders.len();

        tracing::debug!(
            region = %user_region,
            total = stats.total_input,
            distance = stats.distance_matches,
            region_tier = stats.region_matches,
            placeholders = stats.placeholders,
            "Provider matching complete"
        );

        MatchOutcome {
            matches,
            distance_matches,
            region_matches,
            placeholders,
            stats,
        }
    }

    /// Declared region id, or the region derived from the provider's coordinate
    fn provider_region(&self, provider: &ProviderRecord) -> String {
        if let Some(region) = provider
            .region_id
            .as_deref()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
        {
            return region;
        }

        provider.valid_coordinate().map_or_else(
            || OTHER_REGION.to_string(),
            |coordinate| self.resolver.resolve_region(coordinate, self.provider_region_distance_km),
        )
    }
}

/// Distance tier first, then region tier into the remaining slots
///
/// Every free slot up to `max_results` is filled, which also covers the
/// `min_results` backfill: a list still short of the minimum means the region
/// tier has nothing left to give.
fn combine_tiers(
    distance_matches: &[MatchCandidate],
    region_matches: &[MatchCandidate],
    max_results: usize,
) -> Vec<MatchCandidate> {
    distance_matches
        .iter()
        .chain(region_matches)
        .take(max_results)
        .cloned()
        .collect()
}

fn build_placeholders(region_id: &str, region_name: &str) -> Vec<MatchCandidate> {
    (1..=PLACEHOLDER_COUNT)
        .map(|n| {
            let provider = ProviderRecord {
                provider_id: format!("placeholder-{}-{}", region_id, n),
                name: format!("{} provider coming soon", region_name),
                region_id: Some(region_id.to_string()),
                coordinate: None,
                account_active: false,
                status: ProviderStatus::Unknown,
            };
            MatchCandidate {
                note: Some(format!(
                    "No providers are available in {} yet. New providers are joining soon.",
                    region_name
                )),
                ..MatchCandidate::new(provider, MatchType::Placeholder, None)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::regions::RegionTable;
    use crate::models::Coordinate;

    fn create_matcher() -> ProviderMatcher {
        ProviderMatcher::new(Arc::new(LocationResolver::new(RegionTable::embedded().unwrap())))
    }

    fn create_provider(id: &str, region: Option<&str>, lat: f64, lng: f64, status: ProviderStatus) -> ProviderRecord {
        ProviderRecord {
            provider_id: id.to_string(),
            name: format!("Provider {}", id),
            region_id: region.map(str::to_string),
            coordinate: Some(Coordinate::new(lat, lng)),
            account_active: true,
            status,
        }
    }

    fn jakarta_user() -> UserLocationContext {
        UserLocationContext {
            region_id: Some("jakarta".to_string()),
            region_name: Some("Jakarta".to_string()),
            coordinate: Some(Coordinate::new(-6.2088, 106.8456)),
            raw_location_text: None,
        }
    }

    #[test]
    fn test_duplicates_evaluated_once() {
        let matcher = create_matcher();
        let provider = create_provider("1", None, -6.21, 106.85, ProviderStatus::Available);
        let providers = vec![provider.clone(), provider];

        let outcome = matcher.match_providers(&providers, &jakarta_user(), &MatchOptions::default());

        assert_eq!(outcome.distance_matches.len(), 1);
        assert_eq!(outcome.stats.duplicates_skipped, 1);
        assert_eq!(outcome.stats.unique_providers, 1);
    }

    #[test]
    fn test_region_derived_from_coordinate() {
        let matcher = create_matcher();
        // Resolves to jakarta-utara, roughly 16km from the user
        let providers = vec![create_provider("1", None, -6.1385, 106.8827, ProviderStatus::Busy)];
        let user = UserLocationContext {
            coordinate: Some(Coordinate::new(-6.2615, 106.8106)),
            region_id: Some("jakarta-utara".to_string()),
            ..jakarta_user()
        };
        let options = MatchOptions { radius_km: 1.0, ..MatchOptions::default() };

        let outcome = matcher.match_providers(&providers, &user, &options);

        assert_eq!(outcome.region_matches.len(), 1);
        assert!(outcome.distance_matches.is_empty());
    }

    #[test]
    fn test_other_region_never_matches() {
        let matcher = create_matcher();
        let providers = vec![create_provider("1", Some("other"), -30.0, 80.0, ProviderStatus::Available)];
        let user = UserLocationContext {
            region_id: Some("other".to_string()),
            coordinate: None,
            ..jakarta_user()
        };

        let outcome = matcher.match_providers(&providers, &user, &MatchOptions::default());

        assert!(outcome.region_matches.is_empty());
        assert_eq!(outcome.placeholders.len(), PLACEHOLDER_COUNT);
    }

    #[test]
    fn test_matches_capped_at_max_results() {
        let matcher = create_matcher();
        let providers: Vec<ProviderRecord> = (0..20)
            .map(|i| create_provider(&i.to_string(), Some("jakarta"), -6.2088 + i as f64 * 0.001, 106.8456, ProviderStatus::Available))
            .collect();
        let options = MatchOptions { max_results: 12, ..MatchOptions::default() };

        let outcome = matcher.match_providers(&providers, &jakarta_user(), &options);

        assert_eq!(outcome.matches.len(), 12);
        assert_eq!(outcome.distance_matches.len(), 20);
    }

    #[test]
    fn test_region_tier_fills_remaining_slots() {
        let matcher = create_matcher();
        let mut providers = vec![create_provider("near", None, -6.21, 106.85, ProviderStatus::Available)];
        providers.extend((0..5).map(|i| {
            create_provider(&format!("far{}", i), Some("jakarta"), -6.6, 106.8, ProviderStatus::Busy)
        }));
        let options = MatchOptions { max_results: 4, ..MatchOptions::default() };

        let outcome = matcher.match_providers(&providers, &jakarta_user(), &options);

        assert_eq!(outcome.matches.len(), 4);
        assert_eq!(outcome.matches[0].provider.provider_id, "near");
        assert!(outcome.matches[1..].iter().all(|c| c.match_type == MatchType::Region));
    }

    #[test]
    fn test_placeholders_carry_region_name() {
        let matcher = create_matcher();
        let user = UserLocationContext {
            region_name: None,
            ..jakarta_user()
        };

        let outcome = matcher.match_providers(&[], &user, &MatchOptions::default());

        assert_eq!(outcome.placeholders.len(), PLACEHOLDER_COUNT);
        assert_eq!(outcome.placeholders[0].provider.provider_id, "placeholder-jakarta-1");
        assert!(outcome.placeholders.iter().all(|c| c.note.as_deref().is_some_and(|n| n.contains("Jakarta"))));
    }
}
