//! Conversion between native frames and the owned host representation.
//!
//! Capture direction copies the payload out of the native buffer and then drops the
//! raw frame, which returns the buffer to the SDK. Send direction borrows the host
//! frame for the duration of the native call.

use crate::{
    convert,
    frames::{
        video_buffer_len, AudioCaptureOptions, AudioFormat, AudioFrame, FrameTime,
        LineStrideOrSize, MetadataFrame, PixelFormat, ScanType, VideoFrame, MAX_AUDIO_BYTES,
    },
    sys::{Backend, RawAudioFrame, RawMetadataFrame, RawVideoFrame, SendAudio, SendVideo},
    Error, Result,
};

pub(crate) fn video_from_raw(raw: RawVideoFrame) -> Result<VideoFrame> {
    let frame_format_type = ScanType::try_from(raw.frame_format_type).map_err(|_| {
        Error::NotVideo(format!(
            "Unknown frame format type {} in received video frame.",
            raw.frame_format_type
        ))
    })?;
    let len = video_buffer_len(raw.fourcc, raw.xres, raw.yres, raw.line_stride_or_size)?;
    let data = raw
        .buffer
        .view(len)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| Error::NotVideo("Received empty NDI video frame buffer.".into()))?
        .to_vec();

    let line_stride_or_size = if PixelFormat::try_from(raw.fourcc).is_ok() {
        LineStrideOrSize::LineStrideBytes(raw.line_stride_or_size)
    } else {
        LineStrideOrSize::DataSizeBytes(raw.line_stride_or_size)
    };

    Ok(VideoFrame {
        xres: raw.xres,
        yres: raw.yres,
        fourcc: raw.fourcc,
        frame_rate_n: raw.frame_rate_n,
        frame_rate_d: raw.frame_rate_d,
        picture_aspect_ratio: raw.picture_aspect_ratio,
        frame_format_type,
        timecode: FrameTime::from_ticks(raw.timecode),
        timestamp: FrameTime::from_ticks(raw.timestamp),
        line_stride_or_size,
        metadata: raw.metadata,
        data,
    })
}

/// Copy a planar float frame out, converting to the requested layout.
///
/// The emitted `channel_stride_in_bytes` is the stride of the converted layout, so
/// 16-bit output reports half the float stride.
pub(crate) fn audio_from_raw(
    backend: &dyn Backend,
    raw: RawAudioFrame,
    options: AudioCaptureOptions,
) -> Result<AudioFrame> {
    if raw.channels < 0 || raw.samples < 0 || raw.channel_stride_in_bytes < 0 {
        return Err(Error::NotVideo(
            "Received audio frame with negative dimensions.".into(),
        ));
    }
    let channels = raw.channels as usize;
    let samples = raw.samples as usize;
    let native_stride = raw.channel_stride_in_bytes as usize;
    let planar_len = native_stride
        .checked_mul(channels)
        .filter(|len| *len <= MAX_AUDIO_BYTES)
        .ok_or_else(|| Error::NotVideo("Received audio frame exceeds 64 MiB.".into()))?;

    let planar: &[u8] = if planar_len == 0 {
        &[]
    } else {
        raw.buffer
            .view(planar_len)
            .ok_or_else(|| Error::NotVideo("Received empty NDI audio frame buffer.".into()))?
    };

    let format = options.audio_format;
    let (stride, data) = match format {
        AudioFormat::Float32Separate => (native_stride, planar.to_vec()),
        AudioFormat::Float32Interleaved => {
            let floats = convert::f32_samples(planar);
            let out =
                backend.audio_to_interleaved_f32(&floats, channels, samples, native_stride / 4);
            (
                samples * 4 / format.stride_factor(),
                out.iter().flat_map(|s| s.to_ne_bytes()).collect(),
            )
        }
        AudioFormat::Int16Interleaved => {
            let floats = convert::f32_samples(planar);
            let out = backend.audio_to_interleaved_16s(
                &floats,
                channels,
                samples,
                native_stride / 4,
                options.resolved_reference_level(),
            );
            (
                samples * 4 / format.stride_factor(),
                out.iter().flat_map(|s| s.to_ne_bytes()).collect(),
            )
        }
    };
    debug_assert_eq!(data.len(), stride * channels);

    Ok(AudioFrame {
        audio_format: format,
        reference_level: (format == AudioFormat::Int16Interleaved)
            .then(|| options.resolved_reference_level()),
        sample_rate: raw.sample_rate,
        channels: raw.channels,
        samples: raw.samples,
        channel_stride_in_bytes: stride as i32,
        timecode: FrameTime::from_ticks(raw.timecode),
        timestamp: FrameTime::from_ticks(raw.timestamp),
        metadata: raw.metadata,
        data,
    })
}

pub(crate) fn metadata_from_raw(raw: RawMetadataFrame) -> MetadataFrame {
    MetadataFrame {
        data: raw.data,
        timecode: FrameTime::from_ticks(raw.timecode),
        timestamp: FrameTime::from_ticks(raw.timestamp),
    }
}

pub(crate) fn video_to_send(frame: &VideoFrame) -> SendVideo<'_> {
    SendVideo {
        xres: frame.xres,
        yres: frame.yres,
        fourcc: frame.fourcc,
        frame_rate_n: frame.frame_rate_n,
        frame_rate_d: frame.frame_rate_d,
        picture_aspect_ratio: frame.picture_aspect_ratio,
        frame_format_type: frame.frame_format_type.into(),
        timecode: frame.timecode.to_ticks(),
        line_stride_or_size: frame.line_stride_or_size.raw(),
        metadata: frame.metadata.as_deref(),
        data: &frame.data,
    }
}

pub(crate) fn audio_to_send(frame: &AudioFrame) -> SendAudio<'_> {
    SendAudio {
        sample_rate: frame.sample_rate,
        channels: frame.channels,
        samples: frame.samples,
        channel_stride_in_bytes: frame.channel_stride_in_bytes,
        timecode: frame.timecode.to_ticks(),
        metadata: frame.metadata.as_deref(),
        data: &frame.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::LoopbackBackend, sys::FrameBuffer};

    fn raw_audio(channels: i32, samples: i32) -> RawAudioFrame {
        let pcm: Vec<f32> = (0..channels * samples).map(|i| i as f32 / 100.0).collect();
        RawAudioFrame {
            sample_rate: 48_000,
            channels,
            samples,
            fourcc: crate::frames::FOURCC_AUDIO_FLTP,
            channel_stride_in_bytes: samples * 4,
            timecode: 12_345_678_901,
            timestamp: 0,
            metadata: None,
            buffer: FrameBuffer::new(pcm.iter().flat_map(|s| s.to_ne_bytes()).collect::<Vec<u8>>()),
        }
    }

    fn raw_video(data: Vec<u8>) -> RawVideoFrame {
        RawVideoFrame {
            xres: 4,
            yres: 2,
            fourcc: PixelFormat::BGRA.into(),
            frame_rate_n: 30,
            frame_rate_d: 1,
            picture_aspect_ratio: 2.0,
            frame_format_type: 1,
            timecode: 10_000_000,
            timestamp: 25_000_000,
            line_stride_or_size: 16,
            metadata: Some("<x/>".into()),
            buffer: FrameBuffer::new(data),
        }
    }

    #[test]
    fn video_copies_computed_length() {
        let frame = video_from_raw(raw_video(vec![7u8; 40])).unwrap();
        assert_eq!(frame.data.len(), 32);
        assert_eq!(frame.timestamp, FrameTime { seconds: 2, nanoseconds: 500_000_000 });
        assert_eq!(frame.line_stride_bytes(), Some(16));
        assert_eq!(frame.metadata.as_deref(), Some("<x/>"));
    }

    #[test]
    fn empty_video_buffer_is_not_video() {
        let err = video_from_raw(raw_video(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::NotVideo(msg) if msg.contains("empty")));
    }

    #[test]
    fn int16_stride_is_half_of_float_stride() {
        let backend = LoopbackBackend::new();
        let float = audio_from_raw(
            &backend,
            raw_audio(2, 480),
            AudioCaptureOptions::new(AudioFormat::Float32Interleaved),
        )
        .unwrap();
        let int16 = audio_from_raw(
            &backend,
            raw_audio(2, 480),
            AudioCaptureOptions::new(AudioFormat::Int16Interleaved),
        )
        .unwrap();

        assert_eq!(float.channel_stride_in_bytes, 1920);
        assert_eq!(int16.channel_stride_in_bytes * 2, float.channel_stride_in_bytes);
        assert_eq!(int16.data.len(), (int16.channel_stride_in_bytes * int16.channels) as usize);
        assert_eq!(int16.reference_level, Some(20));
        assert_eq!(float.reference_level, None);
    }

    #[test]
    fn planar_keeps_native_layout() {
        let backend = LoopbackBackend::new();
        let frame =
            audio_from_raw(&backend, raw_audio(2, 3), AudioCaptureOptions::default()).unwrap();
        assert_eq!(frame.channel_stride_in_bytes, 12);
        assert_eq!(frame.channel(1), Some(vec![0.03, 0.04, 0.05]));
        assert_eq!(frame.timecode, FrameTime::from_ticks(12_345_678_901));
    }

    #[test]
    fn interleaved_float_orders_by_sample() {
        let backend = LoopbackBackend::new();
        let frame = audio_from_raw(
            &backend,
            raw_audio(2, 2),
            AudioCaptureOptions::new(AudioFormat::Float32Interleaved),
        )
        .unwrap();
        assert_eq!(frame.as_f32(), Some(vec![0.0, 0.02, 0.01, 0.03]));
    }
}
