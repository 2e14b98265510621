use std::cmp::Ordering;

use crate::models::MatchCandidate;

/// Ordering for distance-tier candidates
///
/// Ascending distance, then bookable first, then name, then provider id.
pub fn compare_distance_tier(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    let a_distance = a.distance_km.unwrap_or(f64::INFINITY);
    let b_distance = b.distance_km.unwrap_or(f64::INFINITY);

    a_distance
        .total_cmp(&b_distance)
        .then_with(|| compare_region_tier(a, b))
}

/// Ordering for region-tier candidates
///
/// Bookable first, then name, then provider id.
pub fn compare_region_tier(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.bookable
        .cmp(&a.bookable)
        .then_with(|| a.provider.name.cmp(&b.provider.name))
        .then_with(|| a.provider.provider_id.cmp(&b.provider.provider_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchType, ProviderRecord, ProviderStatus};

    fn candidate(id: &str, name: &str, status: ProviderStatus, distance_km: Option<f64>) -> MatchCandidate {
        let provider = ProviderRecord {
            provider_id: id.to_string(),
            name: name.to_string(),
            region_id: Some("jakarta".to_string()),
            coordinate: None,
            account_active: true,
            status,
        };
        let match_type = if distance_km.is_some() { MatchType::Distance } else { MatchType::Region };
        MatchCandidate::new(provider, match_type, distance_km)
    }

    #[test]
    fn test_distance_tier_nearest_first() {
        let near = candidate("1", "Zed", ProviderStatus::Busy, Some(1.0));
        let far = candidate("2", "Ayu", ProviderStatus::Available, Some(3.0));
        assert_eq!(compare_distance_tier(&near, &far), Ordering::Less);
    }

    #[test]
    fn test_distance_tie_prefers_bookable_then_name() {
        let busy = candidate("1", "Ayu", ProviderStatus::Busy, Some(2.0));
        let available = candidate("2", "Zed", ProviderStatus::Available, Some(2.0));
        assert_eq!(compare_distance_tier(&available, &busy), Ordering::Less);

        let ayu = candidate("3", "Ayu", ProviderStatus::Available, Some(2.0));
        assert_eq!(compare_distance_tier(&ayu, &available), Ordering::Less);
    }

    #[test]
    fn test_region_tier_ignores_distance() {
        let mut list = vec![
            candidate("3", "Citra", ProviderStatus::Busy, None),
            candidate("1", "Budi", ProviderStatus::Available, None),
            candidate("2", "Ayu", ProviderStatus::Busy, None),
        ];
        list.sort_by(compare_region_tier);
        let ids: Vec<&str> = list.iter().map(|c| c.provider.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_identical_names_fall_back_to_id() {
        let a = candidate("a", "Same", ProviderStatus::Busy, None);
        let b = candidate("b", "Same", ProviderStatus::Busy, None);
        assert_eq!(compare_region_tier(&a, &b), Ordering::Less);
    }
}
