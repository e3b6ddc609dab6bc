//! Frame types for video, audio, and metadata.
//!
//! Everything in this module is an owned value snapshot. Payloads are copied out of
//! native buffers on capture and copied back in on send; nothing here aliases memory
//! owned by the SDK.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, Result};

/// Number of native 100 ns ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Maximum allowed size for video frame data (100 MiB).
pub(crate) const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;

/// Maximum allowed size for audio frame data (64 MiB).
pub(crate) const MAX_AUDIO_BYTES: usize = 64 * 1024 * 1024;

/// Reference level used for 16-bit audio conversion when the caller does not pick one.
pub const DEFAULT_REFERENCE_LEVEL_DB: i32 = 20;

/// A timecode or timestamp as a `(seconds, nanoseconds)` pair.
///
/// The SDK expresses both in 100 ns ticks. Conversion uses truncating integer
/// division, so it is exact and reversible for every `i64` tick value.
///
/// ```
/// use ndi_bridge::FrameTime;
///
/// let t = FrameTime::from_ticks(12_345_678_901);
/// assert_eq!((t.seconds, t.nanoseconds), (1234, 567_890_100));
/// assert_eq!(t.to_ticks(), 12_345_678_901);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameTime {
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl FrameTime {
    /// Ask the sender to synthesize a timecode (`i64::MAX` ticks).
    pub const SYNTHESIZE: FrameTime = FrameTime::from_ticks(i64::MAX);

    pub const fn from_ticks(ticks: i64) -> Self {
        Self {
            seconds: ticks / TICKS_PER_SECOND,
            nanoseconds: ((ticks % TICKS_PER_SECOND) * 100) as i32,
        }
    }

    pub const fn to_ticks(self) -> i64 {
        self.seconds * TICKS_PER_SECOND + (self.nanoseconds / 100) as i64
    }
}

/// Video pixel format identifiers (FourCC codes).
///
/// This enum is marked `#[non_exhaustive]` to allow future SDK versions to add new
/// formats. Received frames keep the raw code in [`VideoFrame::fourcc`] so that
/// compressed or unknown formats still round-trip.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u32)]
pub enum PixelFormat {
    /// YCbCr 4:2:2 format (16 bits per pixel).
    UYVY = 0x5956_5955,
    /// UYVY followed by an 8-bit alpha plane.
    UYVA = 0x4156_5955,
    /// 16-bit semi-planar YCbCr 4:2:2.
    P216 = 0x3631_3250,
    /// P216 followed by a 16-bit alpha plane.
    PA16 = 0x3631_4150,
    /// Planar YCrCb 4:2:0.
    YV12 = 0x3231_5659,
    /// Planar YCbCr 4:2:0.
    I420 = 0x3032_3449,
    /// Semi-planar YCbCr 4:2:0.
    NV12 = 0x3231_564E,
    /// Blue-Green-Red-Alpha (32 bits per pixel).
    BGRA = 0x4152_4742,
    /// Blue-Green-Red with padding (32 bits per pixel).
    BGRX = 0x5852_4742,
    /// Red-Green-Blue-Alpha (32 bits per pixel).
    RGBA = 0x4142_4752,
    /// Red-Green-Blue with padding (32 bits per pixel).
    RGBX = 0x5842_4752,
}

/// FourCC of planar 32-bit float audio, the only layout the SDK moves on the wire.
pub(crate) const FOURCC_AUDIO_FLTP: u32 = 0x7054_4C46;

/// Video scan type, the SDK's frame format type.
///
/// Used both for received frames and as the field selector of
/// [`FrameSync::video`](crate::FrameSync::video).
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(i32)]
pub enum ScanType {
    /// Interlaced frame with both fields.
    Interlaced = 0,
    /// Progressive scan, full frames.
    Progressive = 1,
    /// Field 0 only.
    Field0 = 2,
    /// Field 1 only.
    Field1 = 3,
}

impl Default for ScanType {
    fn default() -> Self {
        ScanType::Progressive
    }
}

/// Line stride or data size for video frames.
///
/// The SDK stores one or the other in the same slot; which one applies depends on
/// whether the FourCC is a known uncompressed format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStrideOrSize {
    /// Line stride in bytes for uncompressed formats.
    LineStrideBytes(i32),
    /// Total data size in bytes for compressed or opaque formats.
    DataSizeBytes(i32),
}

impl LineStrideOrSize {
    pub(crate) fn raw(self) -> i32 {
        match self {
            LineStrideOrSize::LineStrideBytes(v) | LineStrideOrSize::DataSizeBytes(v) => v,
        }
    }
}

fn ceil_div2(x: usize) -> usize {
    x.div_ceil(2)
}

/// Total payload length of a video frame.
///
/// `stride_or_size` is the native line stride for known uncompressed formats and the
/// declared data size for everything else.
///
/// - **Packed** (BGRA/BGRX/RGBA/RGBX/UYVY): `stride * yres`
/// - **UYVA**: UYVY plane plus an `xres * yres` alpha plane
/// - **P216**: 16-bit Y plane plus an interleaved 16-bit UV plane, `2 * stride * yres`
/// - **PA16**: P216 plus a 16-bit alpha plane, `3 * stride * yres`
/// - **YV12/I420**: `Y + 2 * (stride/2 * ceil(yres/2))`
/// - **NV12**: `Y + stride * ceil(yres/2)`
///
/// Returns [`Error::NotVideo`] for negative dimensions, arithmetic overflow, or a
/// payload above the 100 MiB cap.
pub(crate) fn video_buffer_len(fourcc: u32, xres: i32, yres: i32, stride_or_size: i32) -> Result<usize> {
    let invalid = |what: &str| Error::NotVideo(format!("Invalid video frame: {what}"));

    if xres < 0 || yres < 0 || stride_or_size < 0 {
        return Err(invalid("negative dimension"));
    }
    let (x, y, s) = (xres as usize, yres as usize, stride_or_size as usize);
    let overflow = || invalid("buffer size overflows");

    let len = match PixelFormat::try_from(fourcc) {
        Ok(PixelFormat::BGRA | PixelFormat::BGRX | PixelFormat::RGBA | PixelFormat::RGBX)
        | Ok(PixelFormat::UYVY) => s.checked_mul(y).ok_or_else(overflow)?,
        Ok(PixelFormat::UYVA) => {
            let yuv = s.checked_mul(y).ok_or_else(overflow)?;
            let alpha = x.checked_mul(y).ok_or_else(overflow)?;
            yuv.checked_add(alpha).ok_or_else(overflow)?
        }
        Ok(PixelFormat::P216) => s
            .checked_mul(y)
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(overflow)?,
        Ok(PixelFormat::PA16) => s
            .checked_mul(y)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(overflow)?,
        Ok(PixelFormat::YV12 | PixelFormat::I420) => {
            let luma = s.checked_mul(y).ok_or_else(overflow)?;
            let plane = (s / 2).checked_mul(ceil_div2(y)).ok_or_else(overflow)?;
            plane
                .checked_mul(2)
                .and_then(|c| c.checked_add(luma))
                .ok_or_else(overflow)?
        }
        Ok(PixelFormat::NV12) => {
            let luma = s.checked_mul(y).ok_or_else(overflow)?;
            let chroma = s.checked_mul(ceil_div2(y)).ok_or_else(overflow)?;
            luma.checked_add(chroma).ok_or_else(overflow)?
        }
        Err(_) => s,
    };

    if len > MAX_VIDEO_BYTES {
        return Err(invalid("buffer exceeds 100 MiB"));
    }
    Ok(len)
}

/// Default line stride (bytes per row of the first plane) for a pixel format.
pub fn calculate_line_stride(format: PixelFormat, width: i32) -> i32 {
    match format {
        PixelFormat::BGRA | PixelFormat::BGRX | PixelFormat::RGBA | PixelFormat::RGBX => width * 4,
        PixelFormat::UYVY | PixelFormat::UYVA => width * 2,
        PixelFormat::P216 | PixelFormat::PA16 => width * 2,
        PixelFormat::YV12 | PixelFormat::I420 | PixelFormat::NV12 => width,
    }
}

/// A video frame copied out of, or destined for, the native layer.
#[derive(Clone)]
pub struct VideoFrame {
    pub xres: i32,
    pub yres: i32,
    /// Raw FourCC; see [`VideoFrame::pixel_format`].
    pub fourcc: u32,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    pub picture_aspect_ratio: f32,
    pub frame_format_type: ScanType,
    pub timecode: FrameTime,
    pub timestamp: FrameTime,
    pub line_stride_or_size: LineStrideOrSize,
    pub metadata: Option<String>,
    pub data: Vec<u8>,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("xres", &self.xres)
            .field("yres", &self.yres)
            .field("fourcc", &self.pixel_format())
            .field("frame_rate", &(self.frame_rate_n, self.frame_rate_d))
            .field("frame_format_type", &self.frame_format_type)
            .field("timecode", &self.timecode)
            .field("timestamp", &self.timestamp)
            .field("line_stride_or_size", &self.line_stride_or_size)
            .field("data (bytes)", &self.data.len())
            .finish()
    }
}

impl VideoFrame {
    pub fn builder() -> VideoFrameBuilder {
        VideoFrameBuilder::new()
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::try_from(self.fourcc).ok()
    }

    /// Line stride in bytes, or `None` for size-addressed (compressed) frames.
    pub fn line_stride_bytes(&self) -> Option<i32> {
        match self.line_stride_or_size {
            LineStrideOrSize::LineStrideBytes(s) => Some(s),
            LineStrideOrSize::DataSizeBytes(_) => None,
        }
    }

    /// Payload length implied by the frame's format, resolution and stride.
    pub fn expected_len(&self) -> Result<usize> {
        video_buffer_len(
            self.fourcc,
            self.xres,
            self.yres,
            self.line_stride_or_size.raw(),
        )
    }

    pub(crate) fn validate_for_send(&self) -> Result<()> {
        if self.xres <= 0 || self.yres <= 0 {
            return Err(Error::InvalidArguments(format!(
                "Video frame resolution must be positive, got {}x{}",
                self.xres, self.yres
            )));
        }
        if self.frame_rate_d == 0 {
            return Err(Error::InvalidArguments(
                "Video frame rate denominator cannot be zero".into(),
            ));
        }
        let expected = self
            .expected_len()
            .map_err(|e| Error::InvalidArguments(e.to_string()))?;
        if self.data.len() < expected {
            return Err(Error::InvalidArguments(format!(
                "Video frame data is {} bytes, format requires {expected}",
                self.data.len()
            )));
        }
        check_metadata(self.metadata.as_deref())
    }
}

fn check_metadata(metadata: Option<&str>) -> Result<()> {
    if metadata.is_some_and(|m| m.contains('\0')) {
        return Err(Error::InvalidArguments(
            "Frame metadata cannot contain NUL bytes".into(),
        ));
    }
    Ok(())
}

/// Builder for outgoing video frames.
#[derive(Debug, Clone, Default)]
pub struct VideoFrameBuilder {
    width: Option<i32>,
    height: Option<i32>,
    pixel_format: Option<PixelFormat>,
    frame_rate_n: Option<i32>,
    frame_rate_d: Option<i32>,
    picture_aspect_ratio: Option<f32>,
    scan_type: Option<ScanType>,
    line_stride: Option<i32>,
    timecode: Option<FrameTime>,
    metadata: Option<String>,
    data: Option<Vec<u8>>,
}

impl VideoFrameBuilder {
    /// Create a new builder.
    ///
    /// Defaults: 1920x1080 BGRA, 30/1 fps, 16:9, progressive, synthesized timecode,
    /// zero-filled payload.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resolution(mut self, width: i32, height: i32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = Some(pixel_format);
        self
    }

    /// Set the frame rate as a fraction (e.g., 30000/1001 for 29.97fps)
    #[must_use]
    pub fn frame_rate(mut self, numerator: i32, denominator: i32) -> Self {
        self.frame_rate_n = Some(numerator);
        self.frame_rate_d = Some(denominator);
        self
    }

    #[must_use]
    pub fn aspect_ratio(mut self, ratio: f32) -> Self {
        self.picture_aspect_ratio = Some(ratio);
        self
    }

    #[must_use]
    pub fn scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = Some(scan_type);
        self
    }

    /// Override the line stride; defaults to [`calculate_line_stride`].
    #[must_use]
    pub fn line_stride(mut self, stride: i32) -> Self {
        self.line_stride = Some(stride);
        self
    }

    #[must_use]
    pub fn timecode(mut self, timecode: FrameTime) -> Self {
        self.timecode = Some(timecode);
        self
    }

    #[must_use]
    pub fn metadata<S: Into<String>>(mut self, meta: S) -> Self {
        self.metadata = Some(meta.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Build the frame.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] if the resolution is not positive or the supplied
    /// payload is shorter than the format requires.
    pub fn build(self) -> Result<VideoFrame> {
        let xres = self.width.unwrap_or(1920);
        let yres = self.height.unwrap_or(1080);
        let format = self.pixel_format.unwrap_or(PixelFormat::BGRA);
        let stride = self
            .line_stride
            .unwrap_or_else(|| calculate_line_stride(format, xres));

        let mut frame = VideoFrame {
            xres,
            yres,
            fourcc: format.into(),
            frame_rate_n: self.frame_rate_n.unwrap_or(30),
            frame_rate_d: self.frame_rate_d.unwrap_or(1),
            picture_aspect_ratio: self.picture_aspect_ratio.unwrap_or(16.0 / 9.0),
            frame_format_type: self.scan_type.unwrap_or_default(),
            timecode: self.timecode.unwrap_or(FrameTime::SYNTHESIZE),
            timestamp: FrameTime::default(),
            line_stride_or_size: LineStrideOrSize::LineStrideBytes(stride),
            metadata: self.metadata,
            data: Vec::new(),
        };

        let len = frame
            .expected_len()
            .map_err(|e| Error::InvalidArguments(e.to_string()))?;
        frame.data = self.data.unwrap_or_else(|| vec![0u8; len]);
        frame.validate_for_send()?;
        Ok(frame)
    }
}

/// Sample layout of an emitted audio frame.
///
/// The numeric values are the ones hosts use to request a format.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AudioFormat {
    /// One contiguous `f32` run per channel, `channel_stride_in_bytes` apart.
    Float32Separate = 0,
    /// `f32` samples interleaved across channels.
    Float32Interleaved = 1,
    /// `i16` samples interleaved across channels, scaled by a reference level.
    Int16Interleaved = 2,
}

impl Default for AudioFormat {
    fn default() -> Self {
        AudioFormat::Float32Separate
    }
}

impl AudioFormat {
    /// Width divisor applied to the float stride; 2 for 16-bit output.
    pub(crate) fn stride_factor(self) -> usize {
        match self {
            AudioFormat::Float32Separate | AudioFormat::Float32Interleaved => 1,
            AudioFormat::Int16Interleaved => 2,
        }
    }
}

/// Per-call audio conversion request for [`Receiver::audio`](crate::Receiver::audio)
/// and [`Receiver::data`](crate::Receiver::data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioCaptureOptions {
    pub audio_format: AudioFormat,
    /// dB headroom for 16-bit output; [`DEFAULT_REFERENCE_LEVEL_DB`] when `None`.
    pub reference_level: Option<i32>,
}

impl AudioCaptureOptions {
    pub fn new(audio_format: AudioFormat) -> Self {
        Self {
            audio_format,
            reference_level: None,
        }
    }

    #[must_use]
    pub fn reference_level(mut self, db: i32) -> Self {
        self.reference_level = Some(db);
        self
    }

    pub(crate) fn resolved_reference_level(&self) -> i32 {
        self.reference_level.unwrap_or(DEFAULT_REFERENCE_LEVEL_DB)
    }
}

/// An audio frame.
///
/// `data.len() == channel_stride_in_bytes * channels` holds for every frame this
/// crate emits. For interleaved formats the stride is the per-channel share of the
/// interleaved buffer.
#[derive(Clone)]
pub struct AudioFrame {
    pub audio_format: AudioFormat,
    /// Only set for [`AudioFormat::Int16Interleaved`].
    pub reference_level: Option<i32>,
    pub sample_rate: i32,
    pub channels: i32,
    pub samples: i32,
    pub channel_stride_in_bytes: i32,
    pub timecode: FrameTime,
    pub timestamp: FrameTime,
    pub metadata: Option<String>,
    pub data: Vec<u8>,
}

impl fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFrame")
            .field("audio_format", &self.audio_format)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("samples", &self.samples)
            .field("channel_stride_in_bytes", &self.channel_stride_in_bytes)
            .field("timestamp", &self.timestamp)
            .field("data (bytes)", &self.data.len())
            .finish()
    }
}

impl AudioFrame {
    pub fn builder() -> AudioFrameBuilder {
        AudioFrameBuilder::new()
    }

    /// Samples as `f32`, in the frame's own layout. `None` for 16-bit frames.
    pub fn as_f32(&self) -> Option<Vec<f32>> {
        match self.audio_format {
            AudioFormat::Float32Separate | AudioFormat::Float32Interleaved => Some(
                self.data
                    .chunks_exact(4)
                    .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            AudioFormat::Int16Interleaved => None,
        }
    }

    /// Samples as `i16`. `None` unless the frame is 16-bit interleaved.
    pub fn as_i16(&self) -> Option<Vec<i16>> {
        match self.audio_format {
            AudioFormat::Int16Interleaved => Some(
                self.data
                    .chunks_exact(2)
                    .map(|b| i16::from_ne_bytes([b[0], b[1]]))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// One channel of a planar float frame.
    pub fn channel(&self, index: usize) -> Option<Vec<f32>> {
        if self.audio_format != AudioFormat::Float32Separate || index >= self.channels as usize {
            return None;
        }
        let stride = self.channel_stride_in_bytes as usize;
        let start = index * stride;
        let bytes = self.data.get(start..start + self.samples as usize * 4)?;
        Some(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }

    pub(crate) fn validate_for_send(&self) -> Result<()> {
        if self.audio_format != AudioFormat::Float32Separate {
            return Err(Error::InvalidArguments(
                "Only planar 32-bit float audio can be sent".into(),
            ));
        }
        if self.sample_rate <= 0 || self.channels <= 0 || self.samples <= 0 {
            return Err(Error::InvalidArguments(format!(
                "Audio frame needs positive rate/channels/samples, got {}/{}/{}",
                self.sample_rate, self.channels, self.samples
            )));
        }
        let min_stride = self.samples as usize * 4;
        let stride = usize::try_from(self.channel_stride_in_bytes).unwrap_or(0);
        if stride < min_stride {
            return Err(Error::InvalidArguments(format!(
                "Audio channel stride {} is smaller than {min_stride}",
                self.channel_stride_in_bytes
            )));
        }
        let expected = stride
            .checked_mul(self.channels as usize)
            .filter(|len| *len <= MAX_AUDIO_BYTES)
            .ok_or_else(|| Error::InvalidArguments("Audio frame exceeds 64 MiB".into()))?;
        if self.data.len() != expected {
            return Err(Error::InvalidArguments(format!(
                "Audio frame data is {} bytes, expected {expected}",
                self.data.len()
            )));
        }
        check_metadata(self.metadata.as_deref())
    }
}

/// Builder for outgoing planar float audio frames.
#[derive(Debug, Clone, Default)]
pub struct AudioFrameBuilder {
    sample_rate: Option<i32>,
    channels: Option<i32>,
    samples: Option<i32>,
    timecode: Option<FrameTime>,
    metadata: Option<String>,
    data: Option<Vec<f32>>,
}

impl AudioFrameBuilder {
    /// Defaults: 48 kHz, 2 channels, 1602 samples of silence.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sample_rate(mut self, rate: i32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    #[must_use]
    pub fn channels(mut self, channels: i32) -> Self {
        self.channels = Some(channels);
        self
    }

    #[must_use]
    pub fn samples(mut self, samples: i32) -> Self {
        self.samples = Some(samples);
        self
    }

    #[must_use]
    pub fn timecode(mut self, timecode: FrameTime) -> Self {
        self.timecode = Some(timecode);
        self
    }

    #[must_use]
    pub fn metadata<S: Into<String>>(mut self, meta: S) -> Self {
        self.metadata = Some(meta.into());
        self
    }

    /// Planar samples: all of channel 0, then all of channel 1, and so on.
    #[must_use]
    pub fn data(mut self, data: Vec<f32>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn build(self) -> Result<AudioFrame> {
        let sample_rate = self.sample_rate.unwrap_or(48_000);
        let channels = self.channels.unwrap_or(2);
        let samples = self.samples.unwrap_or(1602);
        if channels <= 0 || samples <= 0 {
            return Err(Error::InvalidArguments(
                "Audio frame needs positive channels and samples".into(),
            ));
        }
        let total = channels as usize * samples as usize;
        let pcm = self.data.unwrap_or_else(|| vec![0.0; total]);
        if pcm.len() != total {
            return Err(Error::InvalidArguments(format!(
                "Audio data has {} samples, expected {total} ({channels} x {samples})",
                pcm.len()
            )));
        }

        let frame = AudioFrame {
            audio_format: AudioFormat::Float32Separate,
            reference_level: None,
            sample_rate,
            channels,
            samples,
            channel_stride_in_bytes: samples * 4,
            timecode: self.timecode.unwrap_or(FrameTime::SYNTHESIZE),
            timestamp: FrameTime::default(),
            metadata: self.metadata,
            data: pcm.iter().flat_map(|s| s.to_ne_bytes()).collect(),
        };
        frame.validate_for_send()?;
        Ok(frame)
    }
}

/// A metadata frame: an XML payload with its timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFrame {
    pub data: String,
    pub timecode: FrameTime,
    pub timestamp: FrameTime,
}

impl MetadataFrame {
    pub fn new<S: Into<String>>(data: S) -> Self {
        Self {
            data: data.into(),
            timecode: FrameTime::SYNTHESIZE,
            timestamp: FrameTime::default(),
        }
    }
}

/// Discriminator of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Video,
    Audio,
    Metadata,
    SourceChange,
    StatusChange,
    Timeout,
}

impl FrameKind {
    /// The `type` tag hosts see.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Video => "video",
            FrameKind::Audio => "audio",
            FrameKind::Metadata => "metadata",
            FrameKind::SourceChange => "sourceChange",
            FrameKind::StatusChange => "statusChange",
            FrameKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a multiplexed poll.
#[derive(Debug, Clone)]
pub enum Frame {
    Video(VideoFrame),
    Audio(AudioFrame),
    Metadata(MetadataFrame),
    /// The connected source changed (for example it was renamed or rerouted).
    SourceChange,
    /// Connection status of the receiver changed.
    StatusChange,
    /// Nothing arrived within the requested time.
    Timeout,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Video(_) => FrameKind::Video,
            Frame::Audio(_) => FrameKind::Audio,
            Frame::Metadata(_) => FrameKind::Metadata,
            Frame::SourceChange => FrameKind::SourceChange,
            Frame::StatusChange => FrameKind::StatusChange,
            Frame::Timeout => FrameKind::Timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Frame::Timeout)
    }

    pub fn into_video(self) -> Option<VideoFrame> {
        match self {
            Frame::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_audio(self) -> Option<AudioFrame> {
        match self {
            Frame::Audio(a) => Some(a),
            _ => None,
        }
    }
}
