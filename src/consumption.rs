use chrono::Duration;

use crate::tank::HistoryPoint;

/// Estimates daily fuel consumption in liters per day from a tank's
/// measurement history.
///
/// The estimate is the volume delta between the most recent measurement and
/// the most recent measurement at least 24 hours older, normalized to a per-day
/// rate. The history may arrive in any order; points are sorted here. Ties on
/// the timestamp keep their input order (stable sort).
///
/// Returns 0.0 when no estimate is possible: fewer than two points, or no
/// point at least 24 hours older than the latest. Refills make the volume
/// rise, which would read as negative consumption; those are clamped to 0.0.
pub fn calculate_daily_consumption(history: &[HistoryPoint]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }

    // Most recent first.
    let mut points: Vec<&HistoryPoint> = history.iter().collect();
    points.sort_by(|a, b| b.date.cmp(&a.date));

    let latest = points[0];
    let target = latest.date - Duration::hours(24);

    let Some(previous) = points[1..].iter().find(|p| p.date <= target) else {
        return 0.0;
    };

    let days_diff = (latest.date - previous.date).num_seconds() as f64 / 86_400.0;
    if days_diff <= 0.0 {
        return 0.0;
    }

    let volume_diff = previous.volume - latest.volume;
    let daily_consumption = (volume_diff / days_diff).max(0.0);

    // One decimal, matching what the vendor app shows.
    (daily_consumption * 10.0).round() / 10.0
}
