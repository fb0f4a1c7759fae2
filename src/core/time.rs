//! Tick and Time Conversion
//!
//! The host scheduler runs at 20 ticks per second.

use crate::TICKS_PER_SECOND;

/// Ticks to whole seconds (truncating).
pub fn to_seconds(ticks: u64) -> u64 {
    ticks / TICKS_PER_SECOND
}

/// Seconds to ticks.
pub fn to_ticks(seconds: u64) -> u64 {
    seconds * TICKS_PER_SECOND
}

/// Format seconds as zero-padded `HH:MM:SS`. Hours are not wrapped into days.
pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Format seconds as an English sentence, e.g. `1 day 2 hours 23 minutes 20 seconds`.
///
/// Zero-valued units are omitted; zero seconds overall yields an empty string.
pub fn format_sentence(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    [(days, "day"), (hours, "hour"), (minutes, "minute"), (secs, "second")]
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            let plural = if *value > 1 { "s" } else { "" };
            format!("{} {}{}", value, unit, plural)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
