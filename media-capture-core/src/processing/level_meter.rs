use crate::models::sample::{FormatDescriptor, SampleBuffer, SampleEncoding};

/// Signal levels of one audio buffer, normalized to full scale.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Levels {
    pub rms: f32,
    pub peak: f32,
}

/// RMS level of normalized samples.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Peak absolute level of normalized samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Measure an audio buffer's PCM payload.
///
/// Returns `None` for video buffers and for payloads with no complete
/// sample. Integer encodings are normalized to [-1, 1].
pub fn measure(buffer: &SampleBuffer) -> Option<Levels> {
    let FormatDescriptor::Audio { encoding, .. } = *buffer.format() else {
        return None;
    };
    let samples: Vec<f32> = buffer
        .payload()
        .chunks_exact(encoding.bytes_per_sample())
        .map(|chunk| decode(encoding, chunk))
        .filter(|sample| sample.is_finite())
        .collect();
    if samples.is_empty() {
        return None;
    }
    Some(Levels {
        rms: rms_level(&samples),
        peak: peak_level(&samples),
    })
}

fn decode(encoding: SampleEncoding, chunk: &[u8]) -> f32 {
    match encoding {
        SampleEncoding::Float32 => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        SampleEncoding::Int16 => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32_768.0,
        SampleEncoding::Int32 => {
            i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32 / 2_147_483_648.0
        }
    }
}
