//! Portable audio conversions.
//!
//! These mirror the SDK's `NDIlib_util_audio_*` routines and are the default
//! implementations on [`Backend`](crate::sys::Backend).

/// Read native-endian `f32` samples out of a byte payload.
pub(crate) fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub(crate) fn interleave_f32(
    planar: &[f32],
    channels: usize,
    samples: usize,
    stride_in_floats: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(channels * samples);
    for n in 0..samples {
        for ch in 0..channels {
            out.push(planar.get(ch * stride_in_floats + n).copied().unwrap_or(0.0));
        }
    }
    out
}

/// Scale factor from float to 16-bit for `reference_level` dB of headroom.
///
/// At 0 dB a float of 1.0 is full scale; every 20 dB divides the level by ten.
pub(crate) fn int16_scale(reference_level: i32) -> f32 {
    32767.0 * 10f32.powf(-(reference_level as f32) / 20.0)
}

pub(crate) fn interleave_i16(
    planar: &[f32],
    channels: usize,
    samples: usize,
    stride_in_floats: usize,
    reference_level: i32,
) -> Vec<i16> {
    let scale = int16_scale(reference_level);
    interleave_f32(planar, channels, samples, stride_in_floats)
        .into_iter()
        .map(|s| (s * scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Resample planar audio to `out_samples` per channel by duplicating or dropping
/// source samples (nearest-neighbour). Channels beyond the source are silent.
pub(crate) fn resample_planar(
    channels_in: &[Vec<f32>],
    out_channels: usize,
    out_samples: usize,
    consumed: usize,
) -> Vec<f32> {
    let mut out = vec![0.0f32; out_channels * out_samples];
    if consumed == 0 || out_samples == 0 {
        return out;
    }
    for (ch, dst) in out.chunks_exact_mut(out_samples).enumerate() {
        let Some(src) = channels_in.get(ch) else { continue };
        for (i, sample) in dst.iter_mut().enumerate() {
            let idx = i * consumed / out_samples;
            *sample = src.get(idx).copied().unwrap_or(0.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_respects_stride_padding() {
        // two channels, two samples, stride of three floats
        let planar = [1.0, 2.0, 99.0, 3.0, 4.0, 99.0];
        assert_eq!(interleave_f32(&planar, 2, 2, 3), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn int16_reference_level_scales_and_clamps() {
        let planar = [1.0, -1.0, 20.0];
        let out = interleave_i16(&planar, 1, 3, 3, 0);
        assert_eq!(out, vec![32767, -32767, i16::MAX]);

        let headroom = interleave_i16(&[1.0], 1, 1, 1, 20);
        assert_eq!(headroom, vec![3277]);
    }

    #[test]
    fn resample_duplicates_when_upsampling() {
        let src = vec![vec![1.0, 2.0]];
        assert_eq!(resample_planar(&src, 1, 4, 2), vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn resample_drops_when_downsampling_and_pads_channels() {
        let src = vec![vec![1.0, 2.0, 3.0, 4.0]];
        assert_eq!(
            resample_planar(&src, 2, 2, 4),
            vec![1.0, 3.0, 0.0, 0.0]
        );
    }
}
