//! Publishing video, audio, and metadata as a source.

use std::{fmt, sync::Arc};

use crate::{
    dispatch::run_blocking,
    finder::Source,
    frames::{AudioFrame, FrameTime, VideoFrame},
    handle::{Handle, HandleKind},
    marshal,
    sys::NativeSender,
    Error, Ndi, Result,
};

/// Configuration for a [`Sender`].
#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub name: String,
    pub groups: Option<String>,
    /// Pace video sends to the frame rate.
    pub clock_video: bool,
    /// Pace audio sends to the sample rate.
    pub clock_audio: bool,
}

impl SenderOptions {
    pub fn builder<S: Into<String>>(name: S) -> SenderOptionsBuilder {
        SenderOptionsBuilder::new(name)
    }

    /// The rules [`SenderOptionsBuilder::build`] enforces, for options written as a
    /// struct literal.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArguments(
                "Sender name cannot be empty or contain only whitespace".into(),
            ));
        }
        if self.name.contains('\0') || self.groups.as_deref().is_some_and(|g| g.contains('\0')) {
            return Err(Error::InvalidArguments(
                "Sender options cannot contain NUL bytes".into(),
            ));
        }
        if !self.clock_video && !self.clock_audio {
            return Err(Error::InvalidArguments(
                "At least one of clock_video or clock_audio must be true".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SenderOptions`].
#[derive(Debug, Clone)]
pub struct SenderOptionsBuilder {
    name: String,
    groups: Option<String>,
    clock_video: Option<bool>,
    clock_audio: Option<bool>,
}

impl SenderOptionsBuilder {
    /// Both clocks default to on.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            groups: None,
            clock_video: None,
            clock_audio: None,
        }
    }

    #[must_use]
    pub fn groups<S: Into<String>>(mut self, groups: S) -> Self {
        self.groups = Some(groups.into());
        self
    }

    #[must_use]
    pub fn clock_video(mut self, clock: bool) -> Self {
        self.clock_video = Some(clock);
        self
    }

    #[must_use]
    pub fn clock_audio(mut self, clock: bool) -> Self {
        self.clock_audio = Some(clock);
        self
    }

    /// # Errors
    ///
    /// [`Error::InvalidArguments`] if the name is blank, any string holds a NUL
    /// byte, or both clocks are off.
    pub fn build(self) -> Result<SenderOptions> {
        let options = SenderOptions {
            name: self.name,
            groups: self.groups,
            clock_video: self.clock_video.unwrap_or(true),
            clock_audio: self.clock_audio.unwrap_or(true),
        };
        options.validate()?;
        Ok(options)
    }
}

fn rejected(what: &str) -> Error {
    Error::InvalidArguments(format!("The {what} frame was refused by the sender"))
}

/// Result of [`Sender::tally`].
///
/// `changed` is edge-triggered: it is `true` on the first poll after the on-air
/// state moved and `false` on every later poll until it moves again.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TallyState {
    pub changed: bool,
    pub on_program: bool,
    pub on_preview: bool,
}

struct SenderShared {
    handle: Handle<Box<dyn NativeSender>>,
    options: SenderOptions,
}

/// A published source.
///
/// `video` and `audio` copy nothing extra: the owned frame moves to a blocking
/// worker and the native send reads it there. With clocking enabled the send
/// returns at the frame cadence.
///
/// ```no_run
/// # use ndi_bridge::{Ndi, SenderOptions, VideoFrame, PixelFormat};
/// # async fn run() -> Result<(), ndi_bridge::Error> {
/// let ndi = Ndi::loopback()?;
/// let sender = ndi.open_sender(SenderOptions::builder("Camera").build()?).await?;
/// let frame = VideoFrame::builder()
///     .resolution(64, 36)
///     .pixel_format(PixelFormat::BGRA)
///     .build()?;
/// sender.video(frame).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Sender {
    shared: Arc<SenderShared>,
}

impl Sender {
    /// Publish a source named `options.name`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] before dispatch for malformed options,
    /// [`Error::CreateFailed`] if the backend refuses the name.
    pub async fn open(ndi: &Ndi, options: SenderOptions) -> Result<Self> {
        options.validate()?;

        let ndi = ndi.clone();
        run_blocking(move || {
            let native = ndi
                .backend()
                .create_sender(&options)
                .ok_or_else(|| Error::CreateFailed("Failed to create NDI sender.".into()))?;
            Ok(Sender {
                shared: Arc::new(SenderShared {
                    handle: Handle::new(&ndi, HandleKind::Sender, native),
                    options,
                }),
            })
        })
        .await
    }

    pub fn options(&self) -> &SenderOptions {
        &self.shared.options
    }

    /// Send one video frame.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] before dispatch when the payload does not match
    /// the declared format, [`Error::Destroyed`] after destroy.
    pub async fn video(&self, frame: VideoFrame) -> Result<()> {
        frame.validate_for_send()?;
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            let send = marshal::video_to_send(&frame);
            if shared.handle.with(|native| native.send_video(&send))? {
                Ok(())
            } else {
                Err(rejected("video"))
            }
        })
        .await
    }

    /// Send one planar float audio frame.
    pub async fn audio(&self, frame: AudioFrame) -> Result<()> {
        frame.validate_for_send()?;
        let shared = Arc::clone(&self.shared);
        run_blocking(move || {
            let send = marshal::audio_to_send(&frame);
            if shared.handle.with(|native| native.send_audio(&send))? {
                Ok(())
            } else {
                Err(rejected("audio"))
            }
        })
        .await
    }

    /// Send an XML metadata string to every connected receiver.
    pub fn metadata(&self, data: &str) -> Result<bool> {
        if data.contains('\0') {
            return Err(Error::InvalidArguments(
                "Metadata cannot contain NUL bytes".into(),
            ));
        }
        self.shared
            .handle
            .with(|native| native.send_metadata(data, FrameTime::SYNTHESIZE.to_ticks()))
    }

    /// Poll the aggregated on-air state without waiting.
    pub fn tally(&self) -> Result<TallyState> {
        self.shared.handle.with(|native| {
            let (changed, tally) = native.tally(0);
            TallyState {
                changed,
                on_program: tally.on_program,
                on_preview: tally.on_preview,
            }
        })
    }

    /// Number of receivers currently connected.
    pub fn connections(&self) -> Result<i32> {
        self.shared.handle.with(|native| native.connections(0))
    }

    /// The fully-qualified source this sender publishes.
    pub fn source(&self) -> Result<Source> {
        self.shared.handle.with(|native| native.source())
    }

    /// Stop publishing. `false` if already destroyed.
    pub fn destroy(&self) -> bool {
        self.shared.handle.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        !self.shared.handle.is_live()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("name", &self.shared.options.name)
            .field("live", &self.shared.handle.is_live())
            .finish()
    }
}
