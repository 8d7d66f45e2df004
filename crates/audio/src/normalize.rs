//! Peak normalization.

/// Headroom left below full scale, in dB.
pub const DEFAULT_HEADROOM_DB: f32 = 0.1;

/// Scale `channels` so the largest absolute sample sits `headroom_db`
/// below full scale. Silence is left unchanged.
pub fn peak_normalize(channels: &mut [Vec<f32>], headroom_db: f32) {
    let peak = peak(channels);
    if peak <= 0.0 || !peak.is_finite() {
        return;
    }

    let ceiling = 10f32.powf(-headroom_db / 20.0);
    let gain = ceiling / peak;
    for sample in channels.iter_mut().flat_map(|ch| ch.iter_mut()) {
        *sample *= gain;
    }
}

/// Largest absolute sample across all channels.
pub fn peak(channels: &[Vec<f32>]) -> f32 {
    channels
        .iter()
        .flat_map(|ch| ch.iter())
        .fold(0.0f32, |acc, s| acc.max(s.abs()))
}
