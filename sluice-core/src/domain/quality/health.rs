// sluice-core/src/domain/quality/health.rs

use crate::domain::quality::metric::MetricType;

/// Fixed weights of the composite health score. Timeliness does not contribute.
pub const HEALTH_WEIGHTS: [(MetricType, f64); 5] = [
    (MetricType::Completeness, 0.25),
    (MetricType::Accuracy, 0.25),
    (MetricType::Validity, 0.20),
    (MetricType::Consistency, 0.15),
    (MetricType::Uniqueness, 0.15),
];

fn weight_of(metric_type: MetricType) -> Option<f64> {
    HEALTH_WEIGHTS
        .iter()
        .find(|(t, _)| *t == metric_type)
        .map(|(_, w)| *w)
}

/// Weighted average of per-type mean values, renormalised over the types present.
/// No weighted data yields 1.0.
pub fn health_score(averages: &[(MetricType, f64)]) -> f64 {
    let (weighted, total_weight) = averages
        .iter()
        .filter_map(|(t, avg)| weight_of(*t).map(|w| (avg * w, w)))
        .fold((0.0, 0.0), |(sum, tw), (v, w)| (sum + v, tw + w));

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        1.0
    }
}
