//! Resource tier resolution from target request rate

use crate::models::{ResourceTier, TierName};

/// Highest rate served by the low tier
pub const LOW_TIER_MAX_RATE: u32 = 50;

/// Highest rate served by the medium tier
pub const MEDIUM_TIER_MAX_RATE: u32 = 500;

/// Map a target rate to its resource tier. Pure and total.
pub fn resolve_tier(rate: u32) -> ResourceTier {
    let name = if rate <= LOW_TIER_MAX_RATE {
        TierName::Low
    } else if rate <= MEDIUM_TIER_MAX_RATE {
        TierName::Medium
    } else {
        TierName::High
    };
    tier_resources(name)
}

fn tier_resources(name: TierName) -> ResourceTier {
    let (cpu_request, cpu_limit, memory_request, memory_limit) = match name {
        TierName::Low => ("250m", "500m", "256Mi", "512Mi"),
        TierName::Medium => ("500m", "1", "512Mi", "1Gi"),
        TierName::High => ("1", "2", "1Gi", "2Gi"),
    };

    ResourceTier {
        name,
        cpu_request: cpu_request.to_string(),
        memory_request: memory_request.to_string(),
        cpu_limit: cpu_limit.to_string(),
        memory_limit: memory_limit.to_string(),
    }
}
