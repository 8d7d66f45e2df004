//! WAV decoding to planar `f32` and encoding back.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::MixError;

/// Sample layout of a decoded or to-be-encoded WAV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    fn spec(self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: self.sample_format,
        }
    }
}

/// Planar audio: one `Vec<f32>` per channel, samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub format: AudioFormat,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.format.sample_rate)
    }

    /// Decode WAV bytes. `what` names the input in error messages.
    pub fn decode(bytes: &[u8], what: &'static str) -> Result<Self, MixError> {
        let decode_err = |source| MixError::Decode { what, source };
        let mut reader = WavReader::new(Cursor::new(bytes)).map_err(decode_err)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(MixError::InvalidInput(format!("{what} has an empty format")));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(decode_err)?,
            SampleFormat::Int => {
                let scale = int_scale(spec.bits_per_sample);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(decode_err)?
            }
        };

        let n = usize::from(spec.channels);
        let frames = interleaved.len() / n;
        let mut channels = vec![Vec::with_capacity(frames); n];
        for frame in interleaved.chunks_exact(n) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Ok(Self {
            format: AudioFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                bits_per_sample: spec.bits_per_sample,
                sample_format: spec.sample_format,
            },
            channels,
        })
    }

    /// Encode to WAV bytes in `self.format`.
    pub fn encode(&self) -> Result<Vec<u8>, MixError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                WavWriter::new(&mut cursor, self.format.spec()).map_err(MixError::Encode)?;
            let scale = int_scale(self.format.bits_per_sample);

            for i in 0..self.frames() {
                for channel in &self.channels {
                    let sample = channel[i];
                    let written = match self.format.sample_format {
                        SampleFormat::Float => writer.write_sample(sample),
                        SampleFormat::Int => writer.write_sample(quantize(sample, scale)),
                    };
                    written.map_err(MixError::Encode)?;
                }
            }
            writer.finalize().map_err(MixError::Encode)?;
        }
        Ok(cursor.into_inner())
    }
}

/// Full-scale magnitude of a signed integer sample of `bits` width.
fn int_scale(bits: u16) -> f32 {
    (1u64 << (bits.clamp(1, 32) - 1)) as f32
}

fn quantize(sample: f32, scale: f32) -> i32 {
    let max = scale - 1.0;
    (sample * scale).round().clamp(-scale, max) as i32
}
