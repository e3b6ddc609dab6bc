//! Unit tests for the ndi-bridge library.

use crate::{
    error::Error,
    frames::{
        AudioCaptureOptions, AudioFormat, AudioFrame, FrameTime, LineStrideOrSize, PixelFormat,
        ScanType, VideoFrame,
    },
    handle::HandleKind,
    receiver::{Receiver, ReceiverOptions},
    sender::{Sender, SenderOptions},
    Ndi, Source,
};

async fn pair(ndi: &Ndi, name: &str) -> (Sender, Receiver) {
    let sender = ndi
        .open_sender(SenderOptions::builder(name).clock_video(false).build().unwrap())
        .await
        .unwrap();
    let source = sender.source().unwrap();
    let receiver = ndi
        .open_receiver(ReceiverOptions::builder(source).build().unwrap())
        .await
        .unwrap();
    (sender, receiver)
}

fn planar(channels: i32, samples: i32) -> AudioFrame {
    let pcm = (0..channels * samples)
        .map(|i| (i % samples) as f32 / 4.0 * if i < samples { 1.0 } else { -1.0 })
        .collect();
    AudioFrame::builder()
        .channels(channels)
        .samples(samples)
        .data(pcm)
        .build()
        .unwrap()
}

#[test]
fn test_video_frame_builder() {
    let frame = VideoFrame::builder()
        .resolution(64, 36)
        .pixel_format(PixelFormat::BGRA)
        .frame_rate(60000, 1001)
        .build()
        .unwrap();
    assert_eq!(frame.data.len(), 64 * 36 * 4);
    assert_eq!(frame.line_stride_bytes(), Some(256));
    assert_eq!(frame.frame_format_type, ScanType::Progressive);
    assert_eq!(frame.timecode, FrameTime::SYNTHESIZE);
}

#[test]
fn test_video_frame_builder_rejects_short_payload() {
    let err = VideoFrame::builder()
        .resolution(16, 16)
        .pixel_format(PixelFormat::UYVY)
        .data(vec![0; 10])
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
}

#[test]
fn test_planar_yuv_sizes() {
    let frame = VideoFrame::builder()
        .resolution(6, 5)
        .pixel_format(PixelFormat::I420)
        .build()
        .unwrap();
    // 6x5 luma plus two 3x3 chroma planes.
    assert_eq!(frame.data.len(), 30 + 2 * 9);

    let frame = VideoFrame::builder()
        .resolution(6, 5)
        .pixel_format(PixelFormat::NV12)
        .build()
        .unwrap();
    assert_eq!(frame.data.len(), 30 + 18);
}

#[test]
fn test_audio_frame_channel_data() {
    let frame = planar(2, 4);
    assert_eq!(frame.channel_stride_in_bytes, 16);
    assert_eq!(frame.channel(0).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
    assert_eq!(frame.channel(1).unwrap(), vec![-0.0, -0.25, -0.5, -0.75]);
    assert!(frame.channel(2).is_none());
    assert!(frame.as_i16().is_none());
}

#[test]
fn test_audio_frame_builder_checks_sample_count() {
    let err = AudioFrame::builder()
        .channels(2)
        .samples(4)
        .data(vec![0.0; 7])
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_video_fields_survive_the_trip() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Fields").await;

    let payload: Vec<u8> = (0..8 * 4 * 4).map(|i| i as u8).collect();
    let frame = VideoFrame::builder()
        .resolution(8, 4)
        .pixel_format(PixelFormat::RGBX)
        .frame_rate(25, 1)
        .aspect_ratio(2.0)
        .scan_type(ScanType::Interlaced)
        .timecode(FrameTime::from_ticks(12_345_678_901))
        .metadata("<camera id=\"1\"/>")
        .data(payload.clone())
        .build()
        .unwrap();
    sender.video(frame).await.unwrap();

    let got = receiver.video(2000).await.unwrap();
    assert_eq!((got.xres, got.yres), (8, 4));
    assert_eq!(got.pixel_format(), Some(PixelFormat::RGBX));
    assert_eq!((got.frame_rate_n, got.frame_rate_d), (25, 1));
    assert_eq!(got.picture_aspect_ratio, 2.0);
    assert_eq!(got.frame_format_type, ScanType::Interlaced);
    assert_eq!(got.timecode, FrameTime { seconds: 1234, nanoseconds: 567_890_100 });
    assert_eq!(got.line_stride_or_size, LineStrideOrSize::LineStrideBytes(32));
    assert_eq!(got.metadata.as_deref(), Some("<camera id=\"1\"/>"));
    assert_eq!(got.data, payload);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_fourcc_is_size_addressed() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Compressed").await;

    let mut frame = VideoFrame::builder().resolution(2, 2).build().unwrap();
    frame.fourcc = u32::from_le_bytes(*b"H264");
    frame.line_stride_or_size = LineStrideOrSize::DataSizeBytes(5);
    frame.data = vec![1, 2, 3, 4, 5];
    sender.video(frame).await.unwrap();

    let got = receiver.video(2000).await.unwrap();
    assert_eq!(got.pixel_format(), None);
    assert_eq!(got.line_stride_or_size, LineStrideOrSize::DataSizeBytes(5));
    assert_eq!(got.line_stride_bytes(), None);
    assert_eq!(got.data, vec![1, 2, 3, 4, 5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_audio_conversions() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Audio").await;
    for _ in 0..3 {
        sender.audio(planar(2, 4)).await.unwrap();
    }

    let separate = receiver.audio(AudioCaptureOptions::default(), 2000).await.unwrap();
    assert_eq!(separate.audio_format, AudioFormat::Float32Separate);
    assert_eq!(separate.channel(0).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
    assert_eq!(separate.reference_level, None);

    let interleaved = receiver
        .audio(AudioCaptureOptions::new(AudioFormat::Float32Interleaved), 2000)
        .await
        .unwrap();
    assert_eq!(
        interleaved.as_f32().unwrap(),
        vec![0.0, -0.0, 0.25, -0.25, 0.5, -0.5, 0.75, -0.75]
    );
    assert_eq!(interleaved.channel_stride_in_bytes, 16);

    let int16 = receiver
        .audio(
            AudioCaptureOptions::new(AudioFormat::Int16Interleaved).reference_level(0),
            2000,
        )
        .await
        .unwrap();
    assert_eq!(int16.reference_level, Some(0));
    assert_eq!(int16.channel_stride_in_bytes, 8);
    assert_eq!(int16.data.len(), 16);
    let samples = int16.as_i16().unwrap();
    assert_eq!(&samples[..4], &[0, 0, 8192, -8192]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unrequested_kinds_are_discarded() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Mixed").await;

    assert!(sender.metadata("<before/>").unwrap());
    sender
        .video(VideoFrame::builder().resolution(4, 4).build().unwrap())
        .await
        .unwrap();

    // The metadata and the connect notice are consumed while looking for video.
    receiver.video(2000).await.unwrap();
    let err = receiver.metadata(100).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metadata_round_trip() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Meta").await;
    assert!(sender.metadata("<ptz zoom=\"0.5\"/>").unwrap());
    let frame = receiver.metadata(2000).await.unwrap();
    assert_eq!(frame.data, "<ptz zoom=\"0.5\"/>");
    assert!(frame.timecode.seconds > 0);

    let err = sender.metadata("bad\0xml").unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_registry_tracks_every_kind() {
    let ndi = Ndi::loopback().unwrap();
    let (sender, receiver) = pair(&ndi, "Count").await;
    let sync = ndi.open_framesync(&receiver).await.unwrap();
    assert_eq!(ndi.live_handles(HandleKind::Sender), 1);
    assert_eq!(ndi.live_handles(HandleKind::Receiver), 1);
    assert_eq!(ndi.live_handles(HandleKind::FrameSync), 1);

    assert!(sync.destroy());
    assert!(receiver.destroy().unwrap());
    assert!(sender.destroy());
    assert_eq!(ndi.live_handles(HandleKind::Receiver), 0);
    assert_eq!(ndi.live_handles(HandleKind::Sender), 0);
    assert_eq!(ndi.live_handles(HandleKind::FrameSync), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_receiver_to_missing_source_times_out() {
    let ndi = Ndi::loopback().unwrap();
    let receiver = ndi
        .open_receiver(
            ReceiverOptions::builder(Source::new("LOOPBACK (Ghost)"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let err = receiver.video(50).await.unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)));
    assert_eq!(
        err.to_string(),
        "No video data received in the requested time interval."
    );
}
