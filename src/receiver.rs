//! Receiving video, audio, and metadata from a source.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    capture::{capture_any, capture_until, Captured, Wanted},
    dispatch::run_blocking,
    finder::Source,
    frames::{AudioCaptureOptions, AudioFrame, Frame, MetadataFrame, VideoFrame},
    handle::{Handle, HandleKind},
    marshal,
    sys::{NativeReceiver, RawCapture},
    Error, Ndi, Result,
};

/// Pixel layout the receiver asks the SDK to deliver.
///
/// The first part names the layout without alpha, the second the layout used when
/// the source carries alpha.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum RecvColorFormat {
    BGRX_BGRA = 0,
    UYVY_BGRA = 1,
    RGBX_RGBA = 2,
    UYVY_RGBA = 3,
    Fastest = 100,
    Best = 101,
}

impl Default for RecvColorFormat {
    fn default() -> Self {
        RecvColorFormat::Fastest
    }
}

/// How much of the stream the receiver requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum RecvBandwidth {
    MetadataOnly = -10,
    AudioOnly = 10,
    Lowest = 0,
    Highest = 100,
}

impl Default for RecvBandwidth {
    fn default() -> Self {
        RecvBandwidth::Highest
    }
}

/// On-air state pushed from a receiver to the source it watches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub on_program: bool,
    pub on_preview: bool,
}

impl Tally {
    pub fn new(on_program: bool, on_preview: bool) -> Self {
        Tally {
            on_program,
            on_preview,
        }
    }
}

/// Connection parameters for a [`Receiver`].
#[derive(Debug, Clone, Default)]
pub struct ReceiverOptions {
    pub source: Source,
    pub color_format: RecvColorFormat,
    pub bandwidth: RecvBandwidth,
    pub allow_video_fields: bool,
    pub name: Option<String>,
}

impl ReceiverOptions {
    pub fn builder(source: Source) -> ReceiverOptionsBuilder {
        ReceiverOptionsBuilder::new(source)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.source.name.trim().is_empty() {
            return Err(Error::InvalidArguments(
                "Receiver must be created with a source name.".into(),
            ));
        }
        let strings = [Some(&self.source.name), self.source.url_address.as_ref(), self.name.as_ref()];
        if strings.into_iter().flatten().any(|s| s.contains('\0')) {
            return Err(Error::InvalidArguments(
                "Receiver options cannot contain NUL bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ReceiverOptions`].
#[derive(Debug, Clone)]
pub struct ReceiverOptionsBuilder {
    source: Source,
    color_format: Option<RecvColorFormat>,
    bandwidth: Option<RecvBandwidth>,
    allow_video_fields: Option<bool>,
    name: Option<String>,
}

impl ReceiverOptionsBuilder {
    /// Defaults: `Fastest` color, `Highest` bandwidth, fields allowed, no name.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            color_format: None,
            bandwidth: None,
            allow_video_fields: None,
            name: None,
        }
    }

    #[must_use]
    pub fn color(mut self, format: RecvColorFormat) -> Self {
        self.color_format = Some(format);
        self
    }

    /// Select the color format from its numeric value.
    pub fn color_value(self, value: i32) -> Result<Self> {
        let format = RecvColorFormat::try_from(value)
            .map_err(|_| Error::InvalidArguments("Invalid colour format value.".into()))?;
        Ok(self.color(format))
    }

    #[must_use]
    pub fn bandwidth(mut self, bandwidth: RecvBandwidth) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }

    /// Select the bandwidth from its numeric value.
    pub fn bandwidth_value(self, value: i32) -> Result<Self> {
        let bandwidth = RecvBandwidth::try_from(value)
            .map_err(|_| Error::InvalidArguments("Invalid bandwidth value.".into()))?;
        Ok(self.bandwidth(bandwidth))
    }

    #[must_use]
    pub fn allow_video_fields(mut self, allow: bool) -> Self {
        self.allow_video_fields = Some(allow);
        self
    }

    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the options.
    ///
    /// `Fastest` and `Best` always allow fields; the SDK may deliver them anyway.
    pub fn build(self) -> Result<ReceiverOptions> {
        let color_format = self.color_format.unwrap_or_default();
        let allow_video_fields = matches!(color_format, RecvColorFormat::Fastest | RecvColorFormat::Best)
            || self.allow_video_fields.unwrap_or(true);

        let options = ReceiverOptions {
            source: self.source,
            color_format,
            bandwidth: self.bandwidth.unwrap_or_default(),
            allow_video_fields,
            name: self.name,
        };
        options.validate()?;
        Ok(options)
    }
}

pub(crate) struct ReceiverShared {
    pub(crate) handle: Handle<Box<dyn NativeReceiver>>,
    options: ReceiverOptions,
    /// Live frame synchronizers wrapping this receiver.
    pub(crate) framesyncs: AtomicUsize,
}

impl ReceiverShared {
    fn capture_slice(&self, slice_ms: u32) -> Result<RawCapture> {
        self.handle.with(|native| native.capture(slice_ms))
    }
}

/// A connection to one source.
///
/// Captures run on tokio's blocking pool and resolve with owned frames. Issue one
/// capture at a time per receiver; concurrent captures race for frames.
///
/// A timeout of `0` waits until something arrives.
#[derive(Clone)]
pub struct Receiver {
    pub(crate) shared: Arc<ReceiverShared>,
}

impl Receiver {
    /// Connect to `options.source`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] before dispatch for malformed options,
    /// [`Error::CreateFailed`] if the backend refuses the connection.
    pub async fn open(ndi: &Ndi, options: ReceiverOptions) -> Result<Self> {
        options.validate()?;

        let ndi = ndi.clone();
        run_blocking(move || {
            let native = ndi
                .backend()
                .create_receiver(&options)
                .ok_or_else(|| Error::CreateFailed("Failed to create NDI receiver.".into()))?;
            Ok(Receiver {
                shared: Arc::new(ReceiverShared {
                    handle: Handle::new(&ndi, HandleKind::Receiver, native),
                    options,
                    framesyncs: AtomicUsize::new(0),
                }),
            })
        })
        .await
    }

    pub fn source(&self) -> &Source {
        &self.shared.options.source
    }

    pub fn options(&self) -> &ReceiverOptions {
        &self.shared.options
    }

    /// Next video frame.
    ///
    /// # Errors
    ///
    /// [`Error::TimedOut`], [`Error::ConnectionLost`], [`Error::NotVideo`] for an
    /// empty payload, [`Error::Destroyed`].
    pub async fn video(&self, timeout_ms: u32) -> Result<VideoFrame> {
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            match capture_until(|slice| shared.capture_slice(slice), Wanted::Video, timeout_ms)? {
                Captured::Video(raw) => marshal::video_from_raw(raw),
                _ => unreachable!("capture_until only matches the requested kind"),
            }
        })
        .await
    }

    /// Next audio frame, converted per `options`.
    pub async fn audio(&self, options: AudioCaptureOptions, timeout_ms: u32) -> Result<AudioFrame> {
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            match capture_until(|slice| shared.capture_slice(slice), Wanted::Audio, timeout_ms)? {
                Captured::Audio(raw) => {
                    marshal::audio_from_raw(shared.handle.ndi().backend(), raw, options)
                }
                _ => unreachable!("capture_until only matches the requested kind"),
            }
        })
        .await
    }

    pub async fn metadata(&self, timeout_ms: u32) -> Result<MetadataFrame> {
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            match capture_until(|slice| shared.capture_slice(slice), Wanted::Metadata, timeout_ms)? {
                Captured::Metadata(raw) => Ok(marshal::metadata_from_raw(raw)),
                _ => unreachable!("capture_until only matches the requested kind"),
            }
        })
        .await
    }

    /// Whatever arrives first, including source and status changes.
    ///
    /// Running out of time is not an error here: the result is [`Frame::Timeout`].
    pub async fn data(&self, options: AudioCaptureOptions, timeout_ms: u32) -> Result<Frame> {
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            Ok(match capture_any(|slice| shared.capture_slice(slice), timeout_ms)? {
                RawCapture::Video(raw) => Frame::Video(marshal::video_from_raw(raw)?),
                RawCapture::Audio(raw) => Frame::Audio(marshal::audio_from_raw(
                    shared.handle.ndi().backend(),
                    raw,
                    options,
                )?),
                RawCapture::Metadata(raw) => Frame::Metadata(marshal::metadata_from_raw(raw)),
                RawCapture::SourceChange => Frame::SourceChange,
                RawCapture::StatusChange => Frame::StatusChange,
                RawCapture::None | RawCapture::Error => Frame::Timeout,
            })
        })
        .await
    }

    /// Push on-air state to the source.
    pub fn tally(&self, tally: Tally) -> Result<bool> {
        self.shared.handle.with(|native| native.set_tally(tally))
    }

    /// Release the connection now.
    ///
    /// Returns `Ok(false)` if it was already released.
    ///
    /// # Errors
    ///
    /// [`Error::HandleInUse`] while a [`FrameSync`](crate::FrameSync) still wraps this
    /// receiver. Destroy the frame synchronizer first.
    pub fn destroy(&self) -> Result<bool> {
        // A FrameSync takes its lease before touching the handle, so checking under
        // the slot lock cannot miss one that is being opened.
        self.shared.handle.destroy_unless(|| {
            match self.shared.framesyncs.load(Ordering::Acquire) {
                0 => Ok(()),
                dependents => Err(Error::HandleInUse(format!(
                    "Receiver is still wrapped by {dependents} frame synchronizer(s)"
                ))),
            }
        })
    }

    pub fn is_destroyed(&self) -> bool {
        !self.shared.handle.is_live()
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("source", &self.shared.options.source)
            .field("live", &self.shared.handle.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastest_and_best_force_fields() {
        let options = ReceiverOptions::builder(Source::new("X (A)"))
            .color(RecvColorFormat::Best)
            .allow_video_fields(false)
            .build()
            .unwrap();
        assert!(options.allow_video_fields);

        let options = ReceiverOptions::builder(Source::new("X (A)"))
            .color(RecvColorFormat::UYVY_BGRA)
            .allow_video_fields(false)
            .build()
            .unwrap();
        assert!(!options.allow_video_fields);
        assert_eq!(options.bandwidth, RecvBandwidth::Highest);
    }

    #[test]
    fn numeric_enum_values_are_validated() {
        let builder = ReceiverOptions::builder(Source::new("X (A)"));
        let err = builder.clone().color_value(7).unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: Invalid colour format value.");
        let err = builder.clone().bandwidth_value(55).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));

        let options = builder.bandwidth_value(-10).unwrap().build().unwrap();
        assert_eq!(options.bandwidth, RecvBandwidth::MetadataOnly);
    }

    #[test]
    fn source_name_is_required() {
        let err = ReceiverOptions::builder(Source::new("  ")).build().unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}
