//! Outlier-resistant summary statistics for sample sets.
//!
//! Speeds from a real network path are noisy; a single stalled transfer
//! can drag a plain mean far from the typical rate. The summarizer
//! rejects outliers with an interquartile-range fence before averaging.

use crate::errors::EngineError;
use crate::transfer::SampleKind;

/// Lowest speed treated as a real measurement rather than noise (Mbps).
pub const MIN_VALID_SPEED: f64 = 0.1;
/// Highest speed treated as physically plausible (Mbps).
pub const MAX_REASONABLE_SPEED: f64 = 10_000.0;
/// Default IQR fence multiplier.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Bounds and fence factor applied when filtering a sample set.
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    /// IQR fence multiplier (`k` in `q1 - k*iqr .. q3 + k*iqr`).
    pub iqr_multiplier: f64,
    /// Absolute lower bound; the fence never reaches below this.
    pub min_valid: f64,
    /// Absolute upper bound; the fence never reaches above this.
    pub max_valid: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            min_valid: MIN_VALID_SPEED,
            max_valid: MAX_REASONABLE_SPEED,
        }
    }
}

/// Derived view over one phase's samples. Recomputed from scratch on
/// demand, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryStats {
    /// Mean of the surviving samples.
    pub average: f64,
    /// Median of the surviving samples.
    pub median: f64,
    /// Smallest surviving sample.
    pub min: f64,
    /// Largest surviving sample.
    pub max: f64,
    /// Samples handed to the summarizer.
    pub valid_count: usize,
    /// Samples that survived the fence.
    pub filtered_count: usize,
}

/// Arithmetic mean. Callers guarantee a non-empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Apply the IQR fence, intersected with the absolute valid range.
///
/// With very small inputs the quartile indices collapse onto the same
/// element and the fence degenerates to that single value; a lone
/// in-range sample still survives.
pub fn filter_outliers(values: &[f64], filter: &OutlierFilter) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let q1 = sorted[(n as f64 * 0.25) as usize];
    let q3 = sorted[(n as f64 * 0.75) as usize];
    let iqr = q3 - q1;

    let lower = (q1 - filter.iqr_multiplier * iqr).max(filter.min_valid);
    let upper = (q3 + filter.iqr_multiplier * iqr).min(filter.max_valid);

    sorted.into_iter().filter(|v| *v >= lower && *v <= upper).collect()
}

/// Summarize one phase's samples: IQR outlier rejection, then mean plus
/// descriptive statistics over the survivors.
pub fn summarize(
    values: &[f64],
    filter: &OutlierFilter,
    kind: SampleKind,
) -> Result<SummaryStats, EngineError> {
    if values.is_empty() {
        return Err(EngineError::EmptyFilteredSet(kind));
    }

    let filtered = filter_outliers(values, filter);
    if filtered.is_empty() {
        return Err(EngineError::EmptyFilteredSet(kind));
    }

    // `filtered` is already sorted ascending.
    Ok(SummaryStats {
        average: mean(&filtered),
        median: filtered[filtered.len() / 2],
        min: filtered[0],
        max: filtered[filtered.len() - 1],
        valid_count: values.len(),
        filtered_count: filtered.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn tight_cluster_passes_untouched() {
        let values = [40.1, 39.8, 40.3, 40.0, 39.9, 40.2];
        let stats =
            summarize(&values, &OutlierFilter::default(), SampleKind::Download)
                .unwrap();

        assert_eq!(stats.valid_count, 6);
        assert_eq!(stats.filtered_count, 6);
        assert!((stats.average - mean(&values)).abs() < TOLERANCE);
    }

    #[test]
    fn distant_outlier_is_fenced_out() {
        let values = [20.0, 21.0, 19.5, 20.5, 20.2, 500.0];
        let stats =
            summarize(&values, &OutlierFilter::default(), SampleKind::Download)
                .unwrap();

        assert_eq!(stats.valid_count, 6);
        assert_eq!(stats.filtered_count, 5);
        assert!(stats.max < 500.0);
        assert!(stats.average < 25.0);
    }

    #[test]
    fn single_in_range_value_survives() {
        let stats =
            summarize(&[42.0], &OutlierFilter::default(), SampleKind::Upload)
                .unwrap();

        assert_eq!(stats.valid_count, 1);
        assert_eq!(stats.filtered_count, 1);
        assert!((stats.average - 42.0).abs() < TOLERANCE);
        assert!((stats.median - 42.0).abs() < TOLERANCE);
        assert!((stats.min - 42.0).abs() < TOLERANCE);
        assert!((stats.max - 42.0).abs() < TOLERANCE);
    }

    #[test]
    fn single_out_of_range_value_is_empty() {
        let err =
            summarize(&[0.01], &OutlierFilter::default(), SampleKind::Upload)
                .unwrap_err();
        assert!(matches!(err, EngineError::EmptyFilteredSet(_)));
    }

    #[test]
    fn empty_input_is_empty_filtered_set() {
        let err =
            summarize(&[], &OutlierFilter::default(), SampleKind::Download)
                .unwrap_err();
        assert!(matches!(err, EngineError::EmptyFilteredSet(_)));
    }

    #[test]
    fn mean_of_ping_scenario() {
        // Raw mean, the ping path never goes through the fence.
        let pings = [20.0, 22.0, 19.0, 85.0, 21.0];
        assert!((mean(&pings) - 33.4).abs() < TOLERANCE);
    }

    #[test]
    fn resummarizing_filtered_cluster_is_a_noop() {
        // Outlier goes on the first pass; the surviving cluster then
        // passes through untouched with an identical average.
        let values = [20.0, 21.0, 19.5, 20.5, 20.2, 500.0];
        let filter = OutlierFilter::default();

        let filtered = filter_outliers(&values, &filter);
        assert_eq!(filtered.len(), 5);

        let first =
            summarize(&filtered, &filter, SampleKind::Download).unwrap();
        let second =
            summarize(&filtered, &filter, SampleKind::Download).unwrap();

        assert_eq!(first.filtered_count, first.valid_count);
        assert!((first.average - second.average).abs() < TOLERANCE);
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn counts_and_ordering_invariants(
            values in prop::collection::vec(0.1f64..10_000.0, 1..64),
        ) {
            let filter = OutlierFilter::default();
            if let Ok(stats) =
                summarize(&values, &filter, SampleKind::Download)
            {
                prop_assert!(stats.filtered_count <= stats.valid_count);
                prop_assert!(stats.filtered_count > 0);
                prop_assert!(stats.min <= stats.median + TOLERANCE);
                prop_assert!(stats.median <= stats.max + TOLERANCE);
                prop_assert!(stats.min >= 0.0);
            }
        }
    }
}
