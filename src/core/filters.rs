use crate::models::{ProviderRecord, ProviderStatus};

/// Outcome of the eligibility stage for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Active and reporting a live status
    Eligible,
    /// Active but with no usable status data; shown as a lower-confidence match
    SoftEligible,
    /// Account switched off by an administrator
    Deactivated,
    /// Provider reported itself offline
    Offline,
    /// Neither a region nor a coordinate to match against
    NoLocation,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible | Self::SoftEligible)
    }
}

/// Decide whether a provider may enter matching at all
///
/// This is Stage 1 of the matching pipeline. Deactivated accounts are dropped
/// before anything else so they never surface regardless of distance.
#[inline]
pub fn evaluate_eligibility(provider: &ProviderRecord) -> Eligibility {
    if !provider.account_active {
        return Eligibility::Deactivated;
    }

    let status = match provider.status {
        ProviderStatus::Offline => return Eligibility::Offline,
        // Missing status data must not hide an otherwise active provider
        ProviderStatus::Unknown => Eligibility::SoftEligible,
        ProviderStatus::Available | ProviderStatus::Busy => Eligibility::Eligible,
    };

    if !has_location(provider) {
        return Eligibility::NoLocation;
    }

    status
}

/// A region id or a valid coordinate is required to classify a provider
#[inline]
pub fn has_location(provider: &ProviderRecord) -> bool {
    let has_region = provider
        .region_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());
    has_region || provider.valid_coordinate().is_some()
}
