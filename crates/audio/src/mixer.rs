//! The arrangement mix.
//!
//! 1. Decode both inputs and conform the generated track to the source's
//!    sample rate, channel count and bit depth.
//! 2. Tile or cut the source to exactly [`TARGET_DURATION_SECS`] and
//!    peak-normalize it.
//! 3. Take the leading segment of the melody (two bars when the melody is
//!    three bars long, otherwise four bars), tile it to the source's
//!    length and peak-normalize it.
//! 4. Sum both and peak-normalize the result.

use harmonia_core::music::{bar_duration_secs, TARGET_DURATION_SECS};

use crate::conform::conform;
use crate::error::MixError;
use crate::normalize::{peak_normalize, DEFAULT_HEADROOM_DB};
use crate::wav::AudioBuffer;

/// Mix a percussion recording with a generated melody.
///
/// Pure and deterministic. The output is a WAV in the source's format,
/// exactly [`TARGET_DURATION_SECS`] long. `tags` only labels log output.
pub fn mix(source: &[u8], generated: &[u8], bpm: f64, tags: &str) -> Result<Vec<u8>, MixError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(MixError::InvalidInput(format!("bpm must be positive, got {bpm}")));
    }

    let source = decode_source(source)?;
    let generated = AudioBuffer::decode(generated, "generated track")?;
    if generated.frames() == 0 {
        return Err(MixError::InvalidInput("generated track is empty".into()));
    }

    let format = source.format;
    let rate = f64::from(format.sample_rate);
    let generated = conform(generated, format);
    let target_frames = (TARGET_DURATION_SECS * rate).round() as usize;

    let mut drums = tile(&source.channels, source.frames(), target_frames);
    peak_normalize(&mut drums, DEFAULT_HEADROOM_DB);

    let segment = melody_segment_frames(generated.frames(), rate, bpm).min(generated.frames());
    let mut melody = tile(&generated.channels, segment.max(1), target_frames);
    peak_normalize(&mut melody, DEFAULT_HEADROOM_DB);

    let mut mixed: Vec<Vec<f32>> = drums
        .iter()
        .zip(&melody)
        .map(|(d, m)| d.iter().zip(m).map(|(a, b)| a + b).collect())
        .collect();
    peak_normalize(&mut mixed, DEFAULT_HEADROOM_DB);

    tracing::debug!(
        bpm,
        tags,
        source_secs = source.duration_secs(),
        generated_secs = generated.duration_secs(),
        segment_frames = segment,
        "Mixed arrangement",
    );

    AudioBuffer {
        format,
        channels: mixed,
    }
    .encode()
}

/// Check that `bytes` is a non-empty WAV recording `mix` can use as its
/// source.
pub fn validate_source(bytes: &[u8]) -> Result<(), MixError> {
    decode_source(bytes).map(|_| ())
}

fn decode_source(bytes: &[u8]) -> Result<AudioBuffer, MixError> {
    let source = AudioBuffer::decode(bytes, "source")?;
    if source.frames() == 0 {
        return Err(MixError::InvalidInput("source recording is empty".into()));
    }
    Ok(source)
}

/// Length of the melody segment to loop, in frames.
///
/// A melody that rounds to three bars loops its first two bars; anything
/// else loops its first four.
pub fn melody_segment_frames(generated_frames: usize, sample_rate: f64, bpm: f64) -> usize {
    let bar = bar_duration_secs(bpm);
    let generated_secs = generated_frames as f64 / sample_rate;
    let bars = (generated_secs / bar).round();
    let segment_bars = if bars == 3.0 { 2.0 } else { 4.0 };
    (segment_bars * bar * sample_rate).round() as usize
}

/// Repeat the first `period` frames of each channel from the start and cut
/// to exactly `len` frames.
fn tile(channels: &[Vec<f32>], period: usize, len: usize) -> Vec<Vec<f32>> {
    channels
        .iter()
        .map(|ch| {
            let period = &ch[..period.min(ch.len())];
            period.iter().copied().cycle().take(len).collect()
        })
        .collect()
}
