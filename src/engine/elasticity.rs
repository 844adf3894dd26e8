use crate::config::ElasticityThresholds;
use crate::models::ElasticityClass;

/// Bucket an averaged uplift. Bands are checked from most to least
/// responsive; anything below the MEDIUM band is LOW.
pub fn classify(avg_uplift: f64, thresholds: &ElasticityThresholds) -> ElasticityClass {
    if avg_uplift >= thresholds.extreme.min_uplift {
        ElasticityClass::Extreme
    } else if thresholds.high.contains(avg_uplift) {
        ElasticityClass::High
    } else if thresholds.medium.contains(avg_uplift) {
        ElasticityClass::Medium
    } else {
        ElasticityClass::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpliftBand;

    #[test]
    fn test_default_boundaries_are_inclusive() {
        let t = ElasticityThresholds::default();
        assert_eq!(classify(2.2, &t), ElasticityClass::Extreme);
        assert_eq!(classify(5.0, &t), ElasticityClass::Extreme);
        assert_eq!(classify(2.19, &t), ElasticityClass::High);
        assert_eq!(classify(1.6, &t), ElasticityClass::High);
        assert_eq!(classify(1.2, &t), ElasticityClass::Medium);
        assert_eq!(classify(1.19999, &t), ElasticityClass::Low);
        assert_eq!(classify(0.4, &t), ElasticityClass::Low);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = ElasticityThresholds {
            extreme: UpliftBand { min_uplift: 3.0, max_uplift: None },
            high: UpliftBand { min_uplift: 2.0, max_uplift: Some(2.5) },
            medium: UpliftBand { min_uplift: 1.1, max_uplift: Some(2.0) },
        };
        assert_eq!(classify(2.2, &t), ElasticityClass::High);
        // Gap between HIGH's upper bound and EXTREME falls through to LOW.
        assert_eq!(classify(2.7, &t), ElasticityClass::Low);
        assert_eq!(classify(1.15, &t), ElasticityClass::Medium);
        assert_eq!(classify(3.0, &t), ElasticityClass::Extreme);
    }
}
