//! Frame synchronization for clock-corrected video/audio capture.
//!
//! A [`FrameSync`] turns a receiver's push stream into a pull interface. Reads never
//! block: video returns the most recent frame (repeating it until a newer one
//! arrives), and audio is resampled to exactly the number of samples asked for,
//! padding with silence when the queue runs dry.
//!
//! | Use case | Receiver | FrameSync |
//! |----------|----------|-----------|
//! | Recording, preserving timing | ✓ | |
//! | Playback to a display or sound card | | ✓ |
//! | Mixing several sources on one output clock | | ✓ |
//!
//! While a frame synchronizer is active it owns the receiver's capture path; do not
//! mix it with direct [`Receiver::video`](crate::Receiver::video) calls.

use std::{
    fmt,
    sync::{atomic::Ordering, Arc},
};

use crate::{
    dispatch::run_blocking,
    frames::{AudioCaptureOptions, AudioFrame, Frame, ScanType},
    handle::{Handle, HandleKind},
    marshal,
    receiver::{Receiver, ReceiverShared},
    sys::NativeFrameSync,
    Error, Result,
};

/// Marks the wrapped receiver as in use until dropped.
struct ReceiverLease(Arc<ReceiverShared>);

impl ReceiverLease {
    fn new(shared: Arc<ReceiverShared>) -> Self {
        shared.framesyncs.fetch_add(1, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for ReceiverLease {
    fn drop(&mut self) {
        self.0.framesyncs.fetch_sub(1, Ordering::AcqRel);
    }
}

struct FrameSyncResource {
    // Declared first so the native framesync is freed before the lease ends.
    native: Box<dyn NativeFrameSync>,
    _lease: ReceiverLease,
}

/// Pull-based, never-blocking reader over a [`Receiver`].
///
/// The frame synchronizer keeps the receiver's native connection alive for its own
/// lifetime, and [`Receiver::destroy`] refuses with [`Error::HandleInUse`] until
/// every frame synchronizer on it has been destroyed.
///
/// ```no_run
/// # use ndi_bridge::{Ndi, ReceiverOptions, Source};
/// # async fn run() -> Result<(), ndi_bridge::Error> {
/// let ndi = Ndi::loopback()?;
/// let receiver = ndi
///     .open_receiver(ReceiverOptions::builder(Source::new("LOOPBACK (A)")).build()?)
///     .await?;
/// let sync = ndi.open_framesync(&receiver).await?;
///
/// let frame = sync.video(None)?;
/// let audio = sync.audio(48_000, 2, 1600)?;
/// assert_eq!(audio.samples, 1600);
///
/// sync.destroy();
/// receiver.destroy()?;
/// # let _ = frame;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FrameSync {
    handle: Arc<Handle<FrameSyncResource>>,
    receiver: Receiver,
}

impl FrameSync {
    /// Wrap `receiver`.
    ///
    /// # Errors
    ///
    /// [`Error::Destroyed`] if the receiver is gone, [`Error::CreateFailed`] if the
    /// backend cannot create the synchronizer.
    pub async fn open(receiver: &Receiver) -> Result<Self> {
        let receiver = receiver.clone();
        run_blocking(move || {
            // Taken before creation so a concurrent receiver destroy sees the lease.
            let lease = ReceiverLease::new(Arc::clone(&receiver.shared));
            let native = receiver
                .shared
                .handle
                .with(|native| native.create_framesync())?
                .ok_or_else(|| {
                    Error::CreateFailed("Failed to create NDI frame synchronizer.".into())
                })?;
            let ndi = receiver.shared.handle.ndi().clone();
            Ok(FrameSync {
                handle: Arc::new(Handle::new(
                    &ndi,
                    HandleKind::FrameSync,
                    FrameSyncResource {
                        native,
                        _lease: lease,
                    },
                )),
                receiver,
            })
        })
        .await
    }

    /// The most recent video frame for `field` (progressive when `None`).
    ///
    /// Returns [`Frame::Timeout`] instead of waiting when no video has arrived yet.
    pub fn video(&self, field: Option<ScanType>) -> Result<Frame> {
        let raw = self
            .handle
            .with(|res| res.native.capture_video(field.unwrap_or_default()))?;
        match raw {
            Some(raw) if raw.xres > 0 && raw.yres > 0 && raw.buffer.view(1).is_some() => {
                marshal::video_from_raw(raw).map(Frame::Video)
            }
            _ => Ok(Frame::Timeout),
        }
    }

    /// Exactly `samples` planar float samples per channel.
    ///
    /// A `sample_rate` or `channels` of zero takes the source's own value. Queued
    /// audio is resampled by duplicating or dropping samples; a dry queue yields
    /// silence.
    pub fn audio(&self, sample_rate: i32, channels: i32, samples: i32) -> Result<AudioFrame> {
        if sample_rate < 0 || channels < 0 || samples < 0 {
            return Err(Error::InvalidArguments(format!(
                "Frame sync audio needs non-negative rate/channels/samples, got {sample_rate}/{channels}/{samples}"
            )));
        }
        let raw = self
            .handle
            .with(|res| res.native.capture_audio(sample_rate, channels, samples))?;
        marshal::audio_from_raw(
            self.handle.ndi().backend(),
            raw,
            AudioCaptureOptions::default(),
        )
    }

    /// Samples per channel currently buffered.
    pub fn audio_queue_depth(&self) -> Result<i32> {
        self.handle.with(|res| res.native.audio_queue_depth())
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Release the synchronizer and its hold on the receiver. `false` if already
    /// released.
    pub fn destroy(&self) -> bool {
        self.handle.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        !self.handle.is_live()
    }
}

impl fmt::Debug for FrameSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSync")
            .field("source", self.receiver.source())
            .field("live", &self.handle.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{finder::Source, receiver::ReceiverOptions, Ndi};

    async fn receiver(ndi: &Ndi) -> Receiver {
        ndi.open_receiver(
            ReceiverOptions::builder(Source::new("LOOPBACK (Nobody)"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn lease_blocks_receiver_destroy_until_released() {
        let ndi = Ndi::loopback().unwrap();
        let receiver = receiver(&ndi).await;
        let sync = FrameSync::open(&receiver).await.unwrap();

        assert!(matches!(receiver.destroy(), Err(Error::HandleInUse(_))));
        assert!(!receiver.is_destroyed());

        assert!(sync.destroy());
        assert!(!sync.destroy());
        assert!(receiver.destroy().unwrap());
    }

    #[tokio::test]
    async fn dropping_the_last_clone_releases_the_lease() {
        let ndi = Ndi::loopback().unwrap();
        let receiver = receiver(&ndi).await;
        {
            let sync = FrameSync::open(&receiver).await.unwrap();
            let _clone = sync.clone();
            assert_eq!(receiver.shared.framesyncs.load(Ordering::SeqCst), 1);
        }
        assert_eq!(receiver.shared.framesyncs.load(Ordering::SeqCst), 0);
        assert_eq!(ndi.live_handles(HandleKind::FrameSync), 0);
    }

    #[tokio::test]
    async fn open_on_destroyed_receiver_fails_without_lease() {
        let ndi = Ndi::loopback().unwrap();
        let receiver = receiver(&ndi).await;
        receiver.destroy().unwrap();
        let err = FrameSync::open(&receiver).await.unwrap_err();
        assert!(matches!(err, Error::Destroyed(HandleKind::Receiver)));
        assert_eq!(receiver.shared.framesyncs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_open_and_destroy_never_orphan_a_framesync() {
        let ndi = Ndi::loopback().unwrap();
        for _ in 0..50 {
            let receiver = receiver(&ndi).await;
            let opener = receiver.clone();
            let opened = tokio::spawn(async move { FrameSync::open(&opener).await });
            let destroyed = receiver.destroy();

            match (opened.await.unwrap(), destroyed) {
                (Ok(sync), Err(Error::HandleInUse(_))) => {
                    assert!(!receiver.is_destroyed());
                    sync.destroy();
                }
                (Ok(sync), Ok(true)) => {
                    panic!("receiver destroyed under a live frame sync: {sync:?}")
                }
                (Err(Error::Destroyed(HandleKind::Receiver)), Ok(true)) => {}
                (opened, destroyed) => panic!("unexpected outcome {opened:?} / {destroyed:?}"),
            }
            assert_eq!(receiver.shared.framesyncs.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn negative_audio_arguments_are_rejected() {
        let ndi = Ndi::loopback().unwrap();
        let receiver = receiver(&ndi).await;
        let sync = FrameSync::open(&receiver).await.unwrap();
        assert!(matches!(
            sync.audio(-1, 2, 10),
            Err(Error::InvalidArguments(_))
        ));
        sync.destroy();
        assert!(matches!(
            sync.audio_queue_depth(),
            Err(Error::Destroyed(HandleKind::FrameSync))
        ));
    }
}
