//! Routing forwards whichever source it points at.

mod common;

use ndi_bridge::{Error, FrameKind, RoutingOptions, Source, VideoFrame};

#[tokio::test(flavor = "multi_thread")]
async fn receivers_follow_the_route() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let cam1 = common::sender(&ndi, "Cam1").await?;
    let cam2 = common::sender(&ndi, "Cam2").await?;
    let routing = ndi
        .open_routing(RoutingOptions::builder("Program").build()?)
        .await?;
    let receiver = common::receiver(&ndi, Source::new(routing.source_name()?)).await?;
    assert_eq!(routing.connections()?, 1);

    assert!(routing.change(&cam1.source()?)?);
    let notice = receiver.data(Default::default(), 1000).await?;
    assert_eq!(notice.kind(), FrameKind::SourceChange);

    cam1.video(VideoFrame::builder().resolution(10, 10).build()?).await?;
    cam2.video(VideoFrame::builder().resolution(20, 20).build()?).await?;
    assert_eq!(receiver.video(2000).await?.xres, 10);

    routing.change(&cam2.source()?)?;
    cam1.video(VideoFrame::builder().resolution(10, 10).build()?).await?;
    cam2.video(VideoFrame::builder().resolution(20, 20).build()?).await?;
    assert_eq!(receiver.video(2000).await?.xres, 20);
    assert_eq!(cam2.connections()?, 1);
    assert_eq!(cam1.connections()?, 0);

    assert!(routing.clear()?);
    cam2.video(VideoFrame::builder().resolution(20, 20).build()?).await?;
    assert!(receiver.video(200).await.unwrap_err().is_timeout());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn change_rejects_nul_bytes() -> Result<(), Error> {
    let ndi = common::loopback()?;
    let routing = ndi
        .open_routing(RoutingOptions::builder("Guard").build()?)
        .await?;
    let err = routing.change(&Source::new("BAD\0NAME")).unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
    Ok(())
}
