//! Anomaly scorer.
//!
//! Pure comparison of a realized value against an oracle prediction. Both
//! values must be in the same space; this pipeline's convention is raw
//! (descaled) units, with the coordinator descaling the oracle's prediction
//! before calling in.

/// `true` iff `|actual - predicted| > threshold`.
///
/// Strict inequality: an error exactly at the threshold is not anomalous.
/// Deterministic and side-effect free.
pub fn is_anomalous(actual: f64, predicted: f64, threshold: f64) -> bool {
    (actual - predicted).abs() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn error_exactly_at_threshold_is_not_anomalous() {
        assert!(!is_anomalous(10.5, 10.0, 0.5));
    }

    #[test]
    fn error_just_past_threshold_is_anomalous() {
        assert!(is_anomalous(10.51, 10.0, 0.5));
    }

    #[test]
    fn direction_of_divergence_is_irrelevant() {
        assert!(is_anomalous(9.0, 10.0, 0.5));
        assert!(is_anomalous(11.0, 10.0, 0.5));
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(actual in -1e9f64..1e9, predicted in -1e9f64..1e9, threshold in 0.0f64..1e6) {
            prop_assert_eq!(
                is_anomalous(actual, predicted, threshold),
                is_anomalous(actual, predicted, threshold)
            );
        }

        #[test]
        fn symmetric_in_actual_and_predicted(actual in -1e9f64..1e9, predicted in -1e9f64..1e9, threshold in 0.0f64..1e6) {
            prop_assert_eq!(
                is_anomalous(actual, predicted, threshold),
                is_anomalous(predicted, actual, threshold)
            );
        }
    }
}
