//! Frame synchronizer reads over a live sender.

mod common;

use std::time::{Duration, Instant};

use ndi_bridge::{AudioFrame, Error, Frame, HandleKind, PixelFormat, VideoFrame};

#[tokio::test(flavor = "multi_thread")]
async fn video_never_blocks_and_repeats_the_latest_frame() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let sender = common::sender(&ndi, "Sync").await?;
    let receiver = common::receiver(&ndi, sender.source()?).await?;
    let sync = ndi.open_framesync(&receiver).await?;

    let started = Instant::now();
    assert!(matches!(sync.video(None)?, Frame::Timeout));
    assert!(started.elapsed() < Duration::from_millis(200));

    for width in [16, 32] {
        let frame = VideoFrame::builder()
            .resolution(width, 8)
            .pixel_format(PixelFormat::BGRX)
            .build()?;
        sender.video(frame).await?;
    }

    for _ in 0..3 {
        let frame = sync.video(None)?.into_video().expect("latest video frame");
        assert_eq!((frame.xres, frame.yres), (32, 8));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn audio_returns_exactly_the_requested_samples() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let sender = common::sender(&ndi, "SyncAudio").await?;
    let receiver = common::receiver(&ndi, sender.source()?).await?;
    let sync = ndi.open_framesync(&receiver).await?;

    // Nothing queued yet: silence at the requested shape.
    let silent = sync.audio(48_000, 2, 256)?;
    assert_eq!((silent.channels, silent.samples), (2, 256));
    assert!(silent.channel(0).expect("channel 0").iter().all(|s| *s == 0.0));

    let tone = AudioFrame::builder()
        .sample_rate(48_000)
        .channels(2)
        .samples(480)
        .data(vec![0.5; 960])
        .build()?;
    sender.audio(tone).await?;

    assert_eq!(sync.audio_queue_depth()?, 480);
    let out = sync.audio(48_000, 2, 400)?;
    assert_eq!(out.samples, 400);
    assert_eq!(out.channel_stride_in_bytes, 1600);
    assert!(out.channel(1).expect("channel 1").iter().all(|s| *s == 0.5));
    assert_eq!(sync.audio_queue_depth()?, 80);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn receiver_outlives_its_frame_synchronizer() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let sender = common::sender(&ndi, "Owner").await?;
    let receiver = common::receiver(&ndi, sender.source()?).await?;
    let sync = ndi.open_framesync(&receiver).await?;

    let err = receiver.destroy().unwrap_err();
    assert!(matches!(err, Error::HandleInUse(_)));
    assert_eq!(sync.receiver().source(), receiver.source());

    assert!(sync.destroy());
    assert!(matches!(sync.video(None), Err(Error::Destroyed(HandleKind::FrameSync))));
    assert!(receiver.destroy()?);
    Ok(())
}
