//! Bring a buffer to another buffer's sample rate, channel count and
//! bit depth.

use crate::wav::{AudioBuffer, AudioFormat};

/// Resample, remix and retag `buffer` so it matches `target`.
pub fn conform(buffer: AudioBuffer, target: AudioFormat) -> AudioBuffer {
    let from_rate = buffer.format.sample_rate;
    let channels = buffer
        .channels
        .into_iter()
        .map(|ch| {
            if from_rate == target.sample_rate {
                ch
            } else {
                resample_linear(&ch, from_rate, target.sample_rate)
            }
        })
        .collect();

    AudioBuffer {
        format: target,
        channels: remix(channels, usize::from(target.channels)),
    }
}

/// Linear-interpolation resampling of one channel.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio).round() as usize;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

/// Map `channels` onto `target` output channels.
///
/// Down to mono averages every input channel; up from mono duplicates it;
/// any other change cycles through the inputs.
pub fn remix(channels: Vec<Vec<f32>>, target: usize) -> Vec<Vec<f32>> {
    let source = channels.len();
    if source == target || source == 0 {
        return channels;
    }

    if target == 1 {
        let frames = channels[0].len();
        let scale = 1.0 / source as f32;
        let mono = (0..frames)
            .map(|i| channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect();
        return vec![mono];
    }

    (0..target).map(|c| channels[c % source].clone()).collect()
}

#[cfg(test)]
mod tests {
    use hound::SampleFormat;

    use super::*;

    #[test]
    fn resample_doubles_length_when_upsampling_by_two() {
        let out = resample_linear(&[0.0, 1.0, 0.0, -1.0], 4_000, 8_000);
        assert_eq!(out.len(), 8);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn resample_halves_length_when_downsampling() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample_linear(&samples, 44_100, 22_050);
        assert_eq!(out.len(), 50);
        assert_eq!(out[10], 20.0);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mono = remix(vec![vec![1.0, 0.0], vec![0.0, 0.0]], 1);
        assert_eq!(mono, vec![vec![0.5, 0.0]]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let stereo = remix(vec![vec![0.3, -0.3]], 2);
        assert_eq!(stereo, vec![vec![0.3, -0.3], vec![0.3, -0.3]]);
    }

    #[test]
    fn conform_adopts_target_format() {
        let buffer = AudioBuffer {
            format: AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
            channels: vec![vec![0.1; 16_000]],
        };
        let target = AudioFormat {
            sample_rate: 8_000,
            channels: 2,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let out = conform(buffer, target);

        assert_eq!(out.format, target);
        assert_eq!(out.channels.len(), 2);
        assert_eq!(out.frames(), 8_000);
    }
}
