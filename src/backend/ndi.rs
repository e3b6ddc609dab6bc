//! The NDI SDK backend.
//!
//! Each native object wraps one SDK instance. Receiver and frame-sync instances are
//! reference counted so that a captured frame can keep its owner alive until the
//! frame is returned with the matching `*_free_*` call, even if the handle was
//! destroyed in the meantime.

use std::{
    ffi::{CStr, CString},
    os::raw::c_char,
    ptr, slice,
    sync::Arc,
};

use tracing::warn;

use crate::{
    finder::{FinderOptions, Source},
    frames::ScanType,
    ndi_lib::*,
    receiver::{ReceiverOptions, Tally},
    routing::RoutingOptions,
    sender::SenderOptions,
    sys::{
        Backend, FrameBuffer, NativeBuffer, NativeFinder, NativeFrameSync, NativeReceiver,
        NativeRouter, NativeSender, RawAudioFrame, RawCapture, RawMetadataFrame, RawVideoFrame,
        SendAudio, SendVideo,
    },
};

/// Copy a C string the SDK owns. `None` for null.
///
/// # Safety
///
/// `ptr` is null or points at a NUL-terminated string valid for the call.
unsafe fn owned_string(ptr: *const c_char) -> Option<String> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

fn optional_cstring(value: Option<&str>) -> Option<Option<CString>> {
    match value {
        Some(v) => CString::new(v).ok().map(Some),
        None => Some(None),
    }
}

fn ptr_or_null(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

/// A source in C layout. The strings live as long as this value.
struct CSource {
    name: CString,
    url: Option<CString>,
}

impl CSource {
    fn new(source: &Source) -> Option<Self> {
        Some(Self {
            name: CString::new(source.name.as_str()).ok()?,
            url: optional_cstring(source.url_address.as_deref())?,
        })
    }

    fn raw(&self) -> NDIlib_source_t {
        NDIlib_source_t {
            p_ndi_name: self.name.as_ptr(),
            __bindgen_anon_1: NDIlib_source_t__bindgen_ty_1 {
                p_url_address: ptr_or_null(&self.url),
            },
        }
    }
}

/// # Safety
///
/// `raw` is null or points at a source the SDK keeps valid for the call.
unsafe fn source_from_raw(raw: *const NDIlib_source_t) -> Source {
    let Some(raw) = raw.as_ref() else {
        return Source::default();
    };
    Source {
        name: owned_string(raw.p_ndi_name).unwrap_or_default(),
        url_address: owned_string(raw.__bindgen_anon_1.p_url_address),
    }
}

/// Process-wide SDK library.
#[derive(Debug, Default)]
pub struct NdiBackend;

impl NdiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NdiBackend {
    fn name(&self) -> &'static str {
        "ndi"
    }

    fn initialize(&self) -> bool {
        // SAFETY: both calls take no arguments and may be made from any thread.
        unsafe {
            if !NDIlib_is_supported_CPU() {
                warn!("CPU does not support the instructions NDI requires");
                return false;
            }
            NDIlib_initialize()
        }
    }

    fn destroy(&self) {
        // SAFETY: the runtime calls this once, after every handle has been released.
        unsafe { NDIlib_destroy() }
    }

    fn version(&self) -> String {
        // SAFETY: the SDK returns a static string.
        unsafe { owned_string(NDIlib_version()) }.unwrap_or_default()
    }

    fn create_finder(&self, options: &FinderOptions) -> Option<Box<dyn NativeFinder>> {
        let groups = optional_cstring(options.groups.as_deref())?;
        let extra_ips = optional_cstring(options.extra_ips.as_deref())?;
        let settings = NDIlib_find_create_t {
            show_local_sources: options.show_local_sources,
            p_groups: ptr_or_null(&groups),
            p_extra_ips: ptr_or_null(&extra_ips),
        };
        // SAFETY: settings and its strings outlive the call; the SDK copies them.
        let instance = unsafe { NDIlib_find_create_v2(&settings) };
        if instance.is_null() {
            return None;
        }
        Some(Box::new(NdiFinder { instance }))
    }

    fn create_receiver(&self, options: &ReceiverOptions) -> Option<Box<dyn NativeReceiver>> {
        let source = CSource::new(&options.source)?;
        let name = optional_cstring(options.name.as_deref())?;
        let settings = NDIlib_recv_create_v3_t {
            source_to_connect_to: source.raw(),
            color_format: i32::from(options.color_format) as _,
            bandwidth: i32::from(options.bandwidth) as _,
            allow_video_fields: options.allow_video_fields,
            p_ndi_recv_name: ptr_or_null(&name),
        };
        // SAFETY: settings and the strings it points at outlive both calls.
        let instance = unsafe {
            let instance = NDIlib_recv_create_v3(&settings);
            if !instance.is_null() {
                NDIlib_recv_connect(instance, &settings.source_to_connect_to);
            }
            instance
        };
        if instance.is_null() {
            return None;
        }
        Some(Box::new(NdiReceiver {
            instance: Arc::new(RecvInstance(instance)),
        }))
    }

    fn create_sender(&self, options: &SenderOptions) -> Option<Box<dyn NativeSender>> {
        let name = CString::new(options.name.as_str()).ok()?;
        let groups = optional_cstring(options.groups.as_deref())?;
        let settings = NDIlib_send_create_t {
            p_ndi_name: name.as_ptr(),
            p_groups: ptr_or_null(&groups),
            clock_video: options.clock_video,
            clock_audio: options.clock_audio,
        };
        // SAFETY: the SDK copies the settings during the call.
        let instance = unsafe { NDIlib_send_create(&settings) };
        if instance.is_null() {
            return None;
        }
        Some(Box::new(NdiSender { instance }))
    }

    fn create_router(&self, options: &RoutingOptions) -> Option<Box<dyn NativeRouter>> {
        let name = CString::new(options.name.as_str()).ok()?;
        let groups = optional_cstring(options.groups.as_deref())?;
        let settings = NDIlib_routing_create_t {
            p_ndi_name: name.as_ptr(),
            p_groups: ptr_or_null(&groups),
        };
        // SAFETY: the SDK copies the settings during the call.
        let instance = unsafe { NDIlib_routing_create(&settings) };
        if instance.is_null() {
            return None;
        }
        Some(Box::new(NdiRouter { instance }))
    }

    fn audio_to_interleaved_f32(
        &self,
        planar: &[f32],
        channels: usize,
        samples: usize,
        stride_in_floats: usize,
    ) -> Vec<f32> {
        if !planar_fits(planar, channels, samples, stride_in_floats) {
            return crate::convert::interleave_f32(planar, channels, samples, stride_in_floats);
        }
        let mut out = vec![0.0f32; channels * samples];
        let src = planar_v2(planar, channels, samples, stride_in_floats);
        let mut dst = NDIlib_audio_frame_interleaved_32f_t {
            no_channels: channels as i32,
            no_samples: samples as i32,
            p_data: out.as_mut_ptr(),
            ..Default::default()
        };
        // SAFETY: src covers channels x stride floats and dst has room for every
        // interleaved sample.
        unsafe { NDIlib_util_audio_to_interleaved_32f_v2(&src, &mut dst) };
        out
    }

    fn audio_to_interleaved_16s(
        &self,
        planar: &[f32],
        channels: usize,
        samples: usize,
        stride_in_floats: usize,
        reference_level: i32,
    ) -> Vec<i16> {
        if !planar_fits(planar, channels, samples, stride_in_floats) {
            return crate::convert::interleave_i16(
                planar,
                channels,
                samples,
                stride_in_floats,
                reference_level,
            );
        }
        let mut out = vec![0i16; channels * samples];
        let src = planar_v2(planar, channels, samples, stride_in_floats);
        let mut dst = NDIlib_audio_frame_interleaved_16s_t {
            no_channels: channels as i32,
            no_samples: samples as i32,
            reference_level,
            p_data: out.as_mut_ptr(),
            ..Default::default()
        };
        // SAFETY: as above.
        unsafe { NDIlib_util_audio_to_interleaved_16s_v2(&src, &mut dst) };
        out
    }
}

fn planar_fits(planar: &[f32], channels: usize, samples: usize, stride: usize) -> bool {
    channels > 0 && samples > 0 && stride >= samples && planar.len() >= (channels - 1) * stride + samples
}

/// Describe `planar` to the SDK's conversion utilities, which never write through it.
fn planar_v2(planar: &[f32], channels: usize, samples: usize, stride: usize) -> NDIlib_audio_frame_v2_t {
    NDIlib_audio_frame_v2_t {
        no_channels: channels as i32,
        no_samples: samples as i32,
        p_data: planar.as_ptr() as *mut f32,
        channel_stride_in_bytes: (stride * 4) as i32,
        ..Default::default()
    }
}

struct NdiFinder {
    instance: NDIlib_find_instance_t,
}

// SAFETY: the SDK documents finder calls as thread-safe; the instance is only freed
// in Drop.
unsafe impl Send for NdiFinder {}
unsafe impl Sync for NdiFinder {}

impl NativeFinder for NdiFinder {
    fn wait_for_sources(&self, timeout_ms: u32) -> bool {
        unsafe { NDIlib_find_wait_for_sources(self.instance, timeout_ms) }
    }

    fn current_sources(&self) -> Vec<Source> {
        let mut count = 0u32;
        // SAFETY: the returned array stays valid until the next call on this finder,
        // and every entry is copied before returning.
        unsafe {
            let sources = NDIlib_find_get_current_sources(self.instance, &mut count);
            if sources.is_null() {
                return Vec::new();
            }
            (0..count as usize)
                .map(|i| source_from_raw(sources.add(i)))
                .collect()
        }
    }
}

impl Drop for NdiFinder {
    fn drop(&mut self) {
        unsafe { NDIlib_find_destroy(self.instance) }
    }
}

struct RecvInstance(NDIlib_recv_instance_t);

// SAFETY: receiver calls are thread-safe per the SDK; destruction happens once, in
// Drop, after the last frame guard is gone.
unsafe impl Send for RecvInstance {}
unsafe impl Sync for RecvInstance {}

impl Drop for RecvInstance {
    fn drop(&mut self) {
        unsafe { NDIlib_recv_destroy(self.0) }
    }
}

struct SyncInstance {
    raw: NDIlib_framesync_instance_t,
    // Dropped after the framesync is destroyed.
    _receiver: Arc<RecvInstance>,
}

// SAFETY: see RecvInstance.
unsafe impl Send for SyncInstance {}
unsafe impl Sync for SyncInstance {}

impl Drop for SyncInstance {
    fn drop(&mut self) {
        unsafe { NDIlib_framesync_destroy(self.raw) }
    }
}

/// A captured SDK frame and the call that returns it.
trait Returnable: 'static {
    type Owner: Send + Sync + 'static;
    type Raw: Send + 'static;

    fn data(raw: &Self::Raw) -> *const u8;

    /// # Safety
    ///
    /// `raw` was filled by the capture call matching this kind on `owner`.
    unsafe fn free(owner: &Self::Owner, raw: &mut Self::Raw);
}

/// Frame memory the SDK lent us. Freed on drop.
struct Lent<K: Returnable> {
    owner: Arc<K::Owner>,
    raw: K::Raw,
}

impl<K: Returnable> NativeBuffer for Lent<K> {
    fn view(&self, len: usize) -> Option<&[u8]> {
        let data = K::data(&self.raw);
        if data.is_null() || len == 0 {
            return None;
        }
        // SAFETY: the SDK's declared frame size is at least `len`, which callers
        // derive from the frame's own dimensions.
        Some(unsafe { slice::from_raw_parts(data, len) })
    }
}

impl<K: Returnable> Drop for Lent<K> {
    fn drop(&mut self) {
        unsafe { K::free(&self.owner, &mut self.raw) }
    }
}

struct Video(NDIlib_video_frame_v2_t);
struct Audio(NDIlib_audio_frame_v3_t);

// SAFETY: plain descriptors of SDK-owned memory that is only read.
unsafe impl Send for Video {}
unsafe impl Send for Audio {}

struct RecvVideo;
struct RecvAudio;
struct SyncVideo;
struct SyncAudio;

impl Returnable for RecvVideo {
    type Owner = RecvInstance;
    type Raw = Video;

    fn data(raw: &Video) -> *const u8 {
        raw.0.p_data
    }

    unsafe fn free(owner: &RecvInstance, raw: &mut Video) {
        NDIlib_recv_free_video_v2(owner.0, &raw.0);
    }
}

impl Returnable for RecvAudio {
    type Owner = RecvInstance;
    type Raw = Audio;

    fn data(raw: &Audio) -> *const u8 {
        raw.0.p_data
    }

    unsafe fn free(owner: &RecvInstance, raw: &mut Audio) {
        NDIlib_recv_free_audio_v3(owner.0, &raw.0);
    }
}

impl Returnable for SyncVideo {
    type Owner = SyncInstance;
    type Raw = Video;

    fn data(raw: &Video) -> *const u8 {
        raw.0.p_data
    }

    unsafe fn free(owner: &SyncInstance, raw: &mut Video) {
        NDIlib_framesync_free_video(owner.raw, &mut raw.0);
    }
}

impl Returnable for SyncAudio {
    type Owner = SyncInstance;
    type Raw = Audio;

    fn data(raw: &Audio) -> *const u8 {
        raw.0.p_data
    }

    unsafe fn free(owner: &SyncInstance, raw: &mut Audio) {
        NDIlib_framesync_free_audio_v2(owner.raw, &mut raw.0);
    }
}

fn raw_video<K: Returnable<Raw = Video>>(owner: &Arc<K::Owner>, frame: NDIlib_video_frame_v2_t) -> RawVideoFrame {
    // SAFETY: p_metadata is null or a string owned by the frame.
    let metadata = unsafe { owned_string(frame.p_metadata) };
    RawVideoFrame {
        xres: frame.xres,
        yres: frame.yres,
        fourcc: frame.FourCC as u32,
        frame_rate_n: frame.frame_rate_N,
        frame_rate_d: frame.frame_rate_D,
        picture_aspect_ratio: frame.picture_aspect_ratio,
        frame_format_type: frame.frame_format_type as i32,
        timecode: frame.timecode,
        timestamp: frame.timestamp,
        // SAFETY: both union members are an i32.
        line_stride_or_size: unsafe { frame.__bindgen_anon_1.line_stride_in_bytes },
        metadata,
        buffer: FrameBuffer::new(Lent::<K> {
            owner: Arc::clone(owner),
            raw: Video(frame),
        }),
    }
}

fn raw_audio<K: Returnable<Raw = Audio>>(owner: &Arc<K::Owner>, frame: NDIlib_audio_frame_v3_t) -> RawAudioFrame {
    let metadata = unsafe { owned_string(frame.p_metadata) };
    RawAudioFrame {
        sample_rate: frame.sample_rate,
        channels: frame.no_channels,
        samples: frame.no_samples,
        fourcc: frame.FourCC as u32,
        timecode: frame.timecode,
        timestamp: frame.timestamp,
        // SAFETY: planar float audio uses the stride member.
        channel_stride_in_bytes: unsafe { frame.__bindgen_anon_1.channel_stride_in_bytes },
        metadata,
        buffer: FrameBuffer::new(Lent::<K> {
            owner: Arc::clone(owner),
            raw: Audio(frame),
        }),
    }
}

struct NdiReceiver {
    instance: Arc<RecvInstance>,
}

impl NativeReceiver for NdiReceiver {
    #[allow(non_upper_case_globals)]
    fn capture(&self, timeout_ms: u32) -> RawCapture {
        let mut video = NDIlib_video_frame_v2_t::default();
        let mut audio = NDIlib_audio_frame_v3_t::default();
        let mut meta = NDIlib_metadata_frame_t::default();
        // SAFETY: the instance is live for as long as self; each frame is handed to
        // a guard or freed below.
        let kind = unsafe {
            NDIlib_recv_capture_v3(self.instance.0, &mut video, &mut audio, &mut meta, timeout_ms)
        };

        match kind {
            NDIlib_frame_type_e_NDIlib_frame_type_video => {
                RawCapture::Video(raw_video::<RecvVideo>(&self.instance, video))
            }
            NDIlib_frame_type_e_NDIlib_frame_type_audio => {
                RawCapture::Audio(raw_audio::<RecvAudio>(&self.instance, audio))
            }
            NDIlib_frame_type_e_NDIlib_frame_type_metadata => {
                // SAFETY: the metadata frame was just captured on this instance.
                let data = unsafe {
                    let data = owned_string(meta.p_data).unwrap_or_default();
                    NDIlib_recv_free_metadata(self.instance.0, &meta);
                    data
                };
                RawCapture::Metadata(RawMetadataFrame {
                    data,
                    timecode: meta.timecode,
                    timestamp: 0,
                })
            }
            NDIlib_frame_type_e_NDIlib_frame_type_source_change => RawCapture::SourceChange,
            NDIlib_frame_type_e_NDIlib_frame_type_status_change => RawCapture::StatusChange,
            NDIlib_frame_type_e_NDIlib_frame_type_error => RawCapture::Error,
            _ => RawCapture::None,
        }
    }

    fn set_tally(&self, tally: Tally) -> bool {
        let raw = NDIlib_tally_t {
            on_program: tally.on_program,
            on_preview: tally.on_preview,
        };
        unsafe { NDIlib_recv_set_tally(self.instance.0, &raw) }
    }

    fn create_framesync(&self) -> Option<Box<dyn NativeFrameSync>> {
        // SAFETY: the framesync instance keeps the receiver alive through its Arc.
        let raw = unsafe { NDIlib_framesync_create(self.instance.0) };
        if raw.is_null() {
            return None;
        }
        Some(Box::new(NdiFrameSync {
            instance: Arc::new(SyncInstance {
                raw,
                _receiver: Arc::clone(&self.instance),
            }),
        }))
    }
}

struct NdiFrameSync {
    instance: Arc<SyncInstance>,
}

impl NativeFrameSync for NdiFrameSync {
    fn capture_video(&self, field: ScanType) -> Option<RawVideoFrame> {
        let mut frame = NDIlib_video_frame_v2_t::default();
        unsafe {
            NDIlib_framesync_capture_video(self.instance.raw, &mut frame, i32::from(field) as _);
        }
        if frame.p_data.is_null() {
            // Zeroed frame: nothing received yet. Freeing it is still allowed.
            unsafe { NDIlib_framesync_free_video(self.instance.raw, &mut frame) };
            return None;
        }
        Some(raw_video::<SyncVideo>(&self.instance, frame))
    }

    fn capture_audio(&self, sample_rate: i32, channels: i32, samples: i32) -> RawAudioFrame {
        let mut frame = NDIlib_audio_frame_v3_t::default();
        unsafe {
            NDIlib_framesync_capture_audio_v2(
                self.instance.raw,
                &mut frame,
                sample_rate,
                channels,
                samples,
            );
        }
        raw_audio::<SyncAudio>(&self.instance, frame)
    }

    fn audio_queue_depth(&self) -> i32 {
        unsafe { NDIlib_framesync_audio_queue_depth(self.instance.raw) }
    }
}

struct NdiSender {
    instance: NDIlib_send_instance_t,
}

// SAFETY: the SDK documents the send, tally and connection calls as thread-safe;
// destroy runs in Drop, once no call holds a reference.
unsafe impl Send for NdiSender {}
unsafe impl Sync for NdiSender {}

impl NativeSender for NdiSender {
    fn send_video(&self, frame: &SendVideo<'_>) -> bool {
        let Some(metadata) = optional_cstring(frame.metadata) else {
            return false;
        };
        let raw = NDIlib_video_frame_v2_t {
            xres: frame.xres,
            yres: frame.yres,
            FourCC: frame.fourcc as _,
            frame_rate_N: frame.frame_rate_n,
            frame_rate_D: frame.frame_rate_d,
            picture_aspect_ratio: frame.picture_aspect_ratio,
            frame_format_type: frame.frame_format_type as _,
            timecode: frame.timecode,
            p_data: frame.data.as_ptr() as *mut u8,
            __bindgen_anon_1: NDIlib_video_frame_v2_t__bindgen_ty_1 {
                line_stride_in_bytes: frame.line_stride_or_size,
            },
            p_metadata: ptr_or_null(&metadata),
            timestamp: 0,
        };
        // SAFETY: the synchronous send reads the buffer before returning.
        unsafe { NDIlib_send_send_video_v2(self.instance, &raw) };
        true
    }

    fn send_audio(&self, frame: &SendAudio<'_>) -> bool {
        let Some(metadata) = optional_cstring(frame.metadata) else {
            return false;
        };
        let raw = NDIlib_audio_frame_v3_t {
            sample_rate: frame.sample_rate,
            no_channels: frame.channels,
            no_samples: frame.samples,
            timecode: frame.timecode,
            FourCC: NDIlib_FourCC_audio_type_e_NDIlib_FourCC_audio_type_FLTP as _,
            p_data: frame.data.as_ptr() as *mut u8,
            __bindgen_anon_1: NDIlib_audio_frame_v3_t__bindgen_ty_1 {
                channel_stride_in_bytes: frame.channel_stride_in_bytes,
            },
            p_metadata: ptr_or_null(&metadata),
            timestamp: 0,
        };
        unsafe { NDIlib_send_send_audio_v3(self.instance, &raw) };
        true
    }

    fn send_metadata(&self, data: &str, timecode: i64) -> bool {
        let Ok(data) = CString::new(data) else {
            return false;
        };
        let raw = NDIlib_metadata_frame_t {
            length: 0,
            timecode,
            p_data: data.as_ptr() as *mut c_char,
        };
        unsafe { NDIlib_send_send_metadata(self.instance, &raw) };
        true
    }

    fn tally(&self, timeout_ms: u32) -> (bool, Tally) {
        let mut raw = NDIlib_tally_t::default();
        let changed = unsafe { NDIlib_send_get_tally(self.instance, &mut raw, timeout_ms) };
        (changed, Tally::new(raw.on_program, raw.on_preview))
    }

    fn connections(&self, timeout_ms: u32) -> i32 {
        unsafe { NDIlib_send_get_no_connections(self.instance, timeout_ms) }
    }

    fn source(&self) -> Source {
        unsafe { source_from_raw(NDIlib_send_get_source_name(self.instance)) }
    }
}

impl Drop for NdiSender {
    fn drop(&mut self) {
        unsafe { NDIlib_send_destroy(self.instance) }
    }
}

struct NdiRouter {
    instance: NDIlib_routing_instance_t,
}

// SAFETY: as for NdiSender.
unsafe impl Send for NdiRouter {}
unsafe impl Sync for NdiRouter {}

impl NativeRouter for NdiRouter {
    fn change(&self, source: &Source) -> bool {
        let Some(source) = CSource::new(source) else {
            return false;
        };
        let raw = source.raw();
        unsafe { NDIlib_routing_change(self.instance, &raw) }
    }

    fn clear(&self) -> bool {
        unsafe { NDIlib_routing_clear(self.instance) }
    }

    fn connections(&self, timeout_ms: u32) -> i32 {
        unsafe { NDIlib_routing_get_no_connections(self.instance, timeout_ms) }
    }

    fn source(&self) -> Source {
        unsafe { source_from_raw(NDIlib_routing_get_source_name(self.instance)) }
    }
}

impl Drop for NdiRouter {
    fn drop(&mut self) {
        unsafe { NDIlib_routing_destroy(self.instance) }
    }
}
