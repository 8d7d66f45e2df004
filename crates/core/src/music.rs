//! Musical timing helpers shared by generation and mixing.

/// Beats in one bar (common time).
pub const BEATS_PER_BAR: f64 = 4.0;

/// Fixed length of every mixed arrangement, in seconds.
pub const TARGET_DURATION_SECS: f64 = 30.0;

/// Bars of melody requested from the generator.
const GENERATED_BARS: f64 = 4.0;

/// Slack added on top of the requested melody length, in seconds.
const GENERATION_SLACK_SECS: f64 = 2.0;

/// Duration of one bar at `bpm`, in seconds.
pub fn bar_duration_secs(bpm: f64) -> f64 {
    (60.0 / bpm) * BEATS_PER_BAR
}

/// Upper bound on melody length requested from the generator, in whole
/// seconds: four bars rounded up, plus slack.
pub fn max_generation_secs(bpm: f64) -> u32 {
    (bar_duration_secs(bpm) * GENERATED_BARS).ceil() as u32 + GENERATION_SLACK_SECS as u32
}
