//! Human-readable duration formatting for log output

/// Format selection thresholds (seconds)
const SHORT_FORMAT_MAX: u64 = 100; // < 100s → X.XXs
const MEDIUM_FORMAT_MAX: u64 = 3600; // < 1h → M:SS
                                     // >= 1h → H:MM:SS

/// Format a duration in seconds for display
///
/// - Short format (`X.XXs`): under 100 seconds
/// - Medium format (`M:SS`): under one hour
/// - Long format (`H:MM:SS`): one hour and above
///
/// Negative and non-finite inputs are treated as zero.
///
/// # Examples
///
/// ```
/// use bookplayer_common::human_time::format_duration;
///
/// assert_eq!(format_duration(4.5), "4.50s");
/// assert_eq!(format_duration(330.0), "5:30");
/// assert_eq!(format_duration(36_123.0), "10:02:03");
/// ```
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };

    let whole = seconds.round() as u64;
    if seconds < SHORT_FORMAT_MAX as f64 {
        format!("{:.2}s", seconds)
    } else if whole < MEDIUM_FORMAT_MAX {
        format!("{}:{:02}", whole / 60, whole % 60)
    } else {
        let hours = whole / 3600;
        let mins = (whole % 3600) / 60;
        let secs = whole % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    }
}
