const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.0 * DAY;

const AGE_UNITS: [(f64, &str); 6] = [
    (YEAR, "year"),
    (MONTH, "month"),
    (WEEK, "week"),
    (DAY, "day"),
    (HOUR, "hour"),
    (MINUTE, "minute"),
];

/// Compact score label: `42`, `1.2k`, `1.6M`.
///
/// Anything below 1000 is printed verbatim, which includes every negative
/// score regardless of magnitude.
pub fn format_score(score: i64) -> String {
    if score < 1_000 {
        score.to_string()
    } else if score < 1_000_000 {
        with_tenths(score, 1_000, "k")
    } else {
        with_tenths(score, 1_000_000, "M")
    }
}

// Rounds half up on the exact decimal value, so 999_999 becomes "1000.0k".
fn with_tenths(score: i64, unit: i64, suffix: &str) -> String {
    let step = unit / 10;
    let tenths = (score + step / 2) / step;
    format!("{}.{}{}", tenths / 10, tenths % 10, suffix)
}

/// Relative age of a Unix-seconds timestamp measured against `now`.
pub fn format_age(created_utc: f64, now: i64) -> String {
    let elapsed = now as f64 - created_utc;
    for (unit, label) in AGE_UNITS {
        if elapsed >= unit {
            let count = (elapsed / unit).floor() as i64;
            let plural = if count == 1 { "" } else { "s" };
            return format!("{count} {label}{plural} ago");
        }
    }
    "just now".to_string()
}
