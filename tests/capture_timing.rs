//! Timeout behaviour of the capture calls.

mod common;

use std::time::{Duration, Instant};

use ndi_bridge::{
    AudioCaptureOptions, Error, Frame, FrameKind, PixelFormat, SenderOptions, Source, VideoFrame,
};

#[tokio::test(flavor = "multi_thread")]
async fn video_times_out_within_one_slice() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let receiver = common::receiver(&ndi, Source::new("LOOPBACK (Idle)")).await?;

    for timeout_ms in [1u32, 150, 400] {
        let started = Instant::now();
        let err = receiver.video(timeout_ms).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::TimedOut(_)), "{err:?}");
        assert!(elapsed >= Duration::from_millis(u64::from(timeout_ms)));
        assert!(elapsed < Duration::from_millis(u64::from(timeout_ms) + 1000));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn data_reports_timeout_as_a_value() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let receiver = common::receiver(&ndi, Source::new("LOOPBACK (Idle)")).await?;

    let started = Instant::now();
    let frame = receiver.data(AudioCaptureOptions::default(), 100).await?;
    assert!(matches!(frame, Frame::Timeout));
    assert_eq!(frame.kind().as_str(), "timeout");
    assert!(started.elapsed() < Duration::from_millis(1100));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn data_without_timeout_waits_until_the_connection_drops() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let sender = common::sender(&ndi, "Blink").await?;
    let receiver = common::receiver(&ndi, sender.source()?).await?;

    // Connecting to a live source reports a status change first.
    let first = receiver.data(AudioCaptureOptions::default(), 1000).await?;
    assert_eq!(first.kind(), FrameKind::StatusChange);

    let pending = {
        let receiver = receiver.clone();
        tokio::spawn(async move { receiver.data(AudioCaptureOptions::default(), 0).await })
    };
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!pending.is_finished());

    assert!(sender.destroy());
    let result = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("capture ends after disconnect")
        .expect("task joined");
    assert!(matches!(result, Err(Error::ConnectionLost(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn destroy_interrupts_a_pending_capture() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let receiver = common::receiver(&ndi, Source::new("LOOPBACK (Nobody)")).await?;

    let pending = {
        let receiver = receiver.clone();
        tokio::spawn(async move { receiver.video(0).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Called straight from the async task: it must not wait for the native slice.
    let start = Instant::now();
    assert!(receiver.destroy()?);
    assert!(start.elapsed() < Duration::from_millis(100));

    let result = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("capture ends within a slice")
        .expect("task joined");
    assert!(matches!(result, Err(Error::Destroyed(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn destroy_does_not_wait_for_a_paced_send() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let sender = ndi
        .open_sender(SenderOptions::builder("Slow").clock_video(true).build()?)
        .await?;
    let frame = VideoFrame::builder()
        .resolution(8, 8)
        .pixel_format(PixelFormat::BGRA)
        .frame_rate(1, 1)
        .build()?;
    sender.video(frame.clone()).await?;

    // The second frame is held back for about a second by the clock.
    let pending = {
        let sender = sender.clone();
        tokio::spawn(async move { sender.video(frame).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    assert!(sender.destroy());
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(sender.is_destroyed());

    let result = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("paced send finishes")
        .expect("task joined");
    assert!(result.is_ok(), "{result:?}");
    Ok(())
}
