/// Read-time resting-heart-rate estimate over one local calendar day.
/// Recomputed on every query, never persisted.

/// One hour-aggregate as seen by the estimator. `hour` is the local hour of
/// day the bucket covers.
#[derive(Debug, Clone, Copy)]
pub struct NightHour {
    pub hour: u32,
    pub avg: f64,
    pub count: i64,
}

/// Hours at or before this local hour count as night.
pub const NIGHT_END_HOUR: u32 = 6;
/// An hour needs at least this many samples to qualify.
pub const MIN_SAMPLES_PER_HOUR: i64 = 10;

const WINDOW: usize = 3;

/// Estimate the resting heart rate for a day from its hour aggregates.
///
/// Qualifying hours are local hours 0-6 with enough samples. A 3-hour
/// window slides across them; each window is scored by its mean average
/// heart rate, and the result is the median of the lowest-scoring window's
/// per-hour averages. The median resists a single noisy low hour, so with
/// fewer than three qualifying hours the whole set forms one window rather
/// than letting a one-hour tail win outright. Falls back to the day's
/// stored minimum when no night hour qualifies.
pub fn resting_heart_rate(hours: &[NightHour], day_min_fallback: Option<f64>) -> Option<i64> {
    let mut night: Vec<&NightHour> = hours
        .iter()
        .filter(|h| h.hour <= NIGHT_END_HOUR && h.count >= MIN_SAMPLES_PER_HOUR)
        .collect();
    if night.is_empty() {
        return day_min_fallback.map(|v| v.round() as i64);
    }
    night.sort_by_key(|h| h.hour);

    let mut best_score = f64::INFINITY;
    let mut best_median = f64::INFINITY;
    if night.len() < WINDOW {
        let avgs: Vec<f64> = night.iter().map(|h| h.avg).collect();
        best_median = median(&avgs);
    } else {
        for window in night.windows(WINDOW) {
            let avgs: Vec<f64> = window.iter().map(|h| h.avg).collect();
            let score = avgs.iter().sum::<f64>() / avgs.len() as f64;
            if score < best_score {
                best_score = score;
                best_median = median(&avgs);
            }
        }
    }
    Some(best_median.round() as i64)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
