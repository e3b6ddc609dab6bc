//! The seam between this crate and a transport implementation.
//!
//! A [`Backend`] creates native objects. Each native object owns exactly one SDK
//! resource and releases it in `Drop`. Calls on these traits may block; the public
//! handle types decide which thread they run on.
//!
//! Values crossing this seam are in native units: 100 ns ticks, raw FourCC codes and
//! stride-or-size integers. Captured payloads stay in native memory behind a
//! [`FrameBuffer`] until marshaling copies them out.

use std::fmt;

use crate::{
    finder::{FinderOptions, Source},
    receiver::{ReceiverOptions, Tally},
    routing::RoutingOptions,
    sender::SenderOptions,
    ScanType,
};

/// Native payload storage for a captured frame.
///
/// Implementations free the native frame when dropped, exactly like the SDK's
/// `recv_free_*` contract.
pub trait NativeBuffer: Send {
    /// The first `len` bytes of the payload, or `None` when the frame carries no
    /// data or fewer than `len` bytes.
    fn view(&self, len: usize) -> Option<&[u8]>;
}

impl NativeBuffer for Vec<u8> {
    fn view(&self, len: usize) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        self.get(..len)
    }
}

impl NativeBuffer for std::sync::Arc<[u8]> {
    fn view(&self, len: usize) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        self.get(..len)
    }
}

/// Owning guard over a native payload.
pub struct FrameBuffer(Box<dyn NativeBuffer>);

impl FrameBuffer {
    pub fn new<B: NativeBuffer + 'static>(buffer: B) -> Self {
        Self(Box::new(buffer))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn view(&self, len: usize) -> Option<&[u8]> {
        self.0.view(len)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FrameBuffer")
    }
}

/// A captured video frame in native units.
#[derive(Debug)]
pub struct RawVideoFrame {
    pub xres: i32,
    pub yres: i32,
    pub fourcc: u32,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    pub picture_aspect_ratio: f32,
    pub frame_format_type: i32,
    pub timecode: i64,
    pub timestamp: i64,
    pub line_stride_or_size: i32,
    pub metadata: Option<String>,
    pub buffer: FrameBuffer,
}

/// A captured planar float audio frame in native units.
#[derive(Debug)]
pub struct RawAudioFrame {
    pub sample_rate: i32,
    pub channels: i32,
    pub samples: i32,
    pub fourcc: u32,
    pub channel_stride_in_bytes: i32,
    pub timecode: i64,
    pub timestamp: i64,
    pub metadata: Option<String>,
    pub buffer: FrameBuffer,
}

#[derive(Debug, Clone)]
pub struct RawMetadataFrame {
    pub data: String,
    pub timecode: i64,
    pub timestamp: i64,
}

/// Outcome of one native capture call.
#[derive(Debug)]
pub enum RawCapture {
    /// Nothing arrived within the wait slice.
    None,
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
    Metadata(RawMetadataFrame),
    SourceChange,
    StatusChange,
    /// The transport reported an error; the connection is gone.
    Error,
}

/// Borrowed video frame handed to a native send.
#[derive(Debug, Clone, Copy)]
pub struct SendVideo<'a> {
    pub xres: i32,
    pub yres: i32,
    pub fourcc: u32,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    pub picture_aspect_ratio: f32,
    pub frame_format_type: i32,
    pub timecode: i64,
    pub line_stride_or_size: i32,
    pub metadata: Option<&'a str>,
    pub data: &'a [u8],
}

/// Borrowed planar float audio frame handed to a native send.
#[derive(Debug, Clone, Copy)]
pub struct SendAudio<'a> {
    pub sample_rate: i32,
    pub channels: i32,
    pub samples: i32,
    pub channel_stride_in_bytes: i32,
    pub timecode: i64,
    pub metadata: Option<&'a str>,
    pub data: &'a [u8],
}

/// Creates native objects and owns process-wide SDK state.
pub trait Backend: Send + Sync {
    /// Short name for logs, e.g. `"loopback"` or `"ndi"`.
    fn name(&self) -> &'static str;

    /// Process-wide init. Called once per runtime lifetime.
    fn initialize(&self) -> bool;

    /// Process-wide teardown. Called once, after every handle is gone.
    fn destroy(&self);

    fn version(&self) -> String;

    fn create_finder(&self, options: &FinderOptions) -> Option<Box<dyn NativeFinder>>;

    fn create_receiver(&self, options: &ReceiverOptions) -> Option<Box<dyn NativeReceiver>>;

    fn create_sender(&self, options: &SenderOptions) -> Option<Box<dyn NativeSender>>;

    fn create_router(&self, options: &RoutingOptions) -> Option<Box<dyn NativeRouter>>;

    /// Interleave planar float audio.
    ///
    /// `planar` holds `channels` runs of `stride_in_floats` samples each.
    fn audio_to_interleaved_f32(
        &self,
        planar: &[f32],
        channels: usize,
        samples: usize,
        stride_in_floats: usize,
    ) -> Vec<f32> {
        crate::convert::interleave_f32(planar, channels, samples, stride_in_floats)
    }

    /// Interleave planar float audio into 16-bit samples with `reference_level` dB
    /// of headroom.
    fn audio_to_interleaved_16s(
        &self,
        planar: &[f32],
        channels: usize,
        samples: usize,
        stride_in_floats: usize,
        reference_level: i32,
    ) -> Vec<i16> {
        crate::convert::interleave_i16(planar, channels, samples, stride_in_floats, reference_level)
    }
}

pub trait NativeFinder: Send + Sync {
    /// Block up to `timeout_ms` for the source list to change.
    fn wait_for_sources(&self, timeout_ms: u32) -> bool;

    fn current_sources(&self) -> Vec<Source>;
}

pub trait NativeReceiver: Send + Sync {
    /// Block up to `timeout_ms` for the next frame of any kind.
    fn capture(&self, timeout_ms: u32) -> RawCapture;

    fn set_tally(&self, tally: Tally) -> bool;

    /// Wrap this receiver in a frame synchronizer.
    ///
    /// The caller guarantees the receiver outlives the returned object.
    fn create_framesync(&self) -> Option<Box<dyn NativeFrameSync>>;
}

pub trait NativeSender: Send + Sync {
    /// `false` if the frame could not be handed to the transport.
    fn send_video(&self, frame: &SendVideo<'_>) -> bool;

    fn send_audio(&self, frame: &SendAudio<'_>) -> bool;

    fn send_metadata(&self, data: &str, timecode: i64) -> bool;

    /// Current tally and whether it changed since the previous call.
    fn tally(&self, timeout_ms: u32) -> (bool, Tally);

    fn connections(&self, timeout_ms: u32) -> i32;

    fn source(&self) -> Source;
}

pub trait NativeFrameSync: Send + Sync {
    /// Never blocks. `None` when no video has ever arrived.
    fn capture_video(&self, field: ScanType) -> Option<RawVideoFrame>;

    /// Never blocks. Always returns exactly `samples` samples per channel; zero rate
    /// or channels mean "whatever the source has".
    fn capture_audio(&self, sample_rate: i32, channels: i32, samples: i32) -> RawAudioFrame;

    fn audio_queue_depth(&self) -> i32;
}

pub trait NativeRouter: Send + Sync {
    fn change(&self, source: &Source) -> bool;

    fn clear(&self) -> bool;

    fn connections(&self, timeout_ms: u32) -> i32;

    fn source(&self) -> Source;
}
