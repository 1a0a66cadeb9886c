use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

pub const MAX_POINTS: i32 = 4096;

const HALF_POINTS: f64 = (MAX_POINTS / 2) as f64;
const LOG_PHASE_MINUTES: f64 = 120.0;
const LOG_PHASE: TimeDelta = TimeDelta::hours(2);
const MIN_WINDOW_FOR_LOG_PHASE: TimeDelta = TimeDelta::hours(3);
const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Points for a first success at `submitted_at` on an input generated at
/// `generated_at`, with the schedule ending at `end`.
///
/// With at least three hours left at generation time, the award falls
/// logarithmically from 4096 to 2048 over the first two hours and then
/// linearly to 0 at `end`. Shorter windows decay linearly over the whole
/// window. Non-increasing in `submitted_at`, 0 from `end` onwards.
pub fn calculate_points(
    generated_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    end: DateTime<Utc>,
) -> i32 {
    if submitted_at >= end || generated_at >= end {
        return 0;
    }

    let elapsed = submitted_at - generated_at;
    if elapsed <= TimeDelta::zero() {
        return MAX_POINTS;
    }

    let window = end - generated_at;
    let remaining = (end - submitted_at).num_milliseconds() as f64;

    let raw = if window >= MIN_WINDOW_FOR_LOG_PHASE {
        if elapsed <= LOG_PHASE {
            let minutes = elapsed.num_milliseconds() as f64 / MILLIS_PER_MINUTE;
            f64::from(MAX_POINTS)
                - HALF_POINTS * (1.0 + minutes).ln() / (1.0 + LOG_PHASE_MINUTES).ln()
        } else {
            HALF_POINTS * remaining / (window - LOG_PHASE).num_milliseconds() as f64
        }
    } else {
        f64::from(MAX_POINTS) * remaining / window.num_milliseconds() as f64
    };

    let points = (raw.round() as i32).clamp(0, MAX_POINTS);
    debug!("Scored {points} points after {}s", elapsed.num_seconds());
    points
}
