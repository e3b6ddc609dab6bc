//! In-process transport.
//!
//! Every [`LoopbackBackend`] owns a private network. Senders and routers published
//! on it are visible to its finders. A sent frame is copied once and queued on every
//! receiver whose source resolves to that sender, either directly or through a
//! chain of routers. Nothing touches the real network, which makes this the backend
//! for tests and offline development.
//!
//! Lock order is network before receiver queue, and frame-sync state before the
//! queue it drains.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak,
    },
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::{debug, trace};

use crate::{
    convert,
    finder::{FinderOptions, Source},
    frames::{ScanType, FOURCC_AUDIO_FLTP},
    receiver::{ReceiverOptions, RecvBandwidth, Tally},
    routing::RoutingOptions,
    sender::SenderOptions,
    sys::{
        Backend, FrameBuffer, NativeFinder, NativeFrameSync, NativeReceiver, NativeRouter,
        NativeSender, RawAudioFrame, RawCapture, RawMetadataFrame, RawVideoFrame, SendAudio,
        SendVideo,
    },
};

const DEFAULT_HOST: &str = "LOOPBACK";
const BASE_PORT: u32 = 5960;
/// Per-receiver backlog; the oldest packet is dropped beyond this.
const MAX_QUEUED: usize = 64;
const MAX_ROUTE_HOPS: usize = 8;
const MAX_BUFFERED_SECONDS: usize = 2;
const DEFAULT_SAMPLE_RATE: i32 = 48_000;
const DEFAULT_CHANNELS: i32 = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wall clock in 100 ns ticks since the Unix epoch.
fn now_ticks() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_nanos() / 100) as i64)
        .unwrap_or(0)
}

/// `(timecode, timestamp)` for an outgoing frame, synthesizing the timecode on request.
fn stamp(timecode: i64) -> (i64, i64) {
    let now = now_ticks();
    (if timecode == i64::MAX { now } else { timecode }, now)
}

/// Comma-separated, case-insensitive group list; empty means `public`.
fn parse_groups(groups: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = groups
        .unwrap_or_default()
        .split(',')
        .map(|g| g.trim().to_ascii_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    if parsed.is_empty() {
        vec!["public".to_owned()]
    } else {
        parsed
    }
}

/// Sleep until the next slot of a clocked stream.
fn pace(next: &Mutex<Option<Instant>>, period: Duration) {
    let due = {
        let mut next = lock(next);
        let now = Instant::now();
        let due = next.filter(|t| *t > now).unwrap_or(now);
        *next = Some(due + period);
        due
    };
    let now = Instant::now();
    if due > now {
        thread::sleep(due - now);
    }
}

#[derive(Debug, Clone)]
struct VideoPacket {
    xres: i32,
    yres: i32,
    fourcc: u32,
    frame_rate_n: i32,
    frame_rate_d: i32,
    picture_aspect_ratio: f32,
    frame_format_type: i32,
    timecode: i64,
    timestamp: i64,
    line_stride_or_size: i32,
    metadata: Option<String>,
    data: Arc<[u8]>,
}

impl VideoPacket {
    fn to_raw(&self) -> RawVideoFrame {
        RawVideoFrame {
            xres: self.xres,
            yres: self.yres,
            fourcc: self.fourcc,
            frame_rate_n: self.frame_rate_n,
            frame_rate_d: self.frame_rate_d,
            picture_aspect_ratio: self.picture_aspect_ratio,
            frame_format_type: self.frame_format_type,
            timecode: self.timecode,
            timestamp: self.timestamp,
            line_stride_or_size: self.line_stride_or_size,
            metadata: self.metadata.clone(),
            buffer: FrameBuffer::new(Arc::clone(&self.data)),
        }
    }
}

#[derive(Debug, Clone)]
struct AudioPacket {
    sample_rate: i32,
    channels: i32,
    samples: i32,
    channel_stride_in_bytes: i32,
    timecode: i64,
    timestamp: i64,
    metadata: Option<String>,
    data: Arc<[u8]>,
}

#[derive(Debug, Clone)]
enum Packet {
    Video(VideoPacket),
    Audio(AudioPacket),
    Metadata(RawMetadataFrame),
    SourceChange,
    StatusChange,
}

impl Packet {
    fn into_capture(self) -> RawCapture {
        match self {
            Packet::Video(video) => RawCapture::Video(video.to_raw()),
            Packet::Audio(audio) => RawCapture::Audio(RawAudioFrame {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                samples: audio.samples,
                fourcc: FOURCC_AUDIO_FLTP,
                channel_stride_in_bytes: audio.channel_stride_in_bytes,
                timecode: audio.timecode,
                timestamp: audio.timestamp,
                metadata: audio.metadata,
                buffer: FrameBuffer::new(audio.data),
            }),
            Packet::Metadata(meta) => RawCapture::Metadata(meta),
            Packet::SourceChange => RawCapture::SourceChange,
            Packet::StatusChange => RawCapture::StatusChange,
        }
    }
}

#[derive(Debug, Default)]
struct RecvState {
    packets: VecDeque<Packet>,
    /// The resolved sender went away; captures report a transport error.
    lost: bool,
    tally: Tally,
}

/// Inbox of one receiver.
#[derive(Debug)]
struct RecvQueue {
    source_name: String,
    bandwidth: RecvBandwidth,
    state: Mutex<RecvState>,
    ready: Condvar,
}

impl RecvQueue {
    fn accepts(&self, packet: &Packet) -> bool {
        !matches!(
            (self.bandwidth, packet),
            (RecvBandwidth::MetadataOnly, Packet::Video(_) | Packet::Audio(_))
                | (RecvBandwidth::AudioOnly, Packet::Video(_))
        )
    }

    fn push(&self, packet: Packet) {
        if !self.accepts(&packet) {
            return;
        }
        let mut state = lock(&self.state);
        if state.packets.len() >= MAX_QUEUED {
            state.packets.pop_front();
        }
        state.packets.push_back(packet);
        drop(state);
        self.ready.notify_all();
    }

    /// The source (re)appeared or was rerouted.
    fn reconnect(&self, notice: Packet) {
        lock(&self.state).lost = false;
        self.push(notice);
    }

    fn disconnect(&self) {
        lock(&self.state).lost = true;
        self.ready.notify_all();
    }

    /// Queued packets are delivered before a pending disconnect.
    fn take(&self, timeout_ms: u32) -> RawCapture {
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut state = lock(&self.state);
        loop {
            if let Some(packet) = state.packets.pop_front() {
                return packet.into_capture();
            }
            if state.lost {
                return RawCapture::Error;
            }
            let now = Instant::now();
            if now >= deadline {
                return RawCapture::None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn drain(&self) -> Vec<Packet> {
        lock(&self.state).packets.drain(..).collect()
    }

    fn tally(&self) -> Tally {
        lock(&self.state).tally
    }
}

#[derive(Debug)]
enum Route {
    Sender,
    /// A router and the full name of the source it currently forwards.
    Router(Option<String>),
}

#[derive(Debug)]
struct Endpoint {
    id: u32,
    source: Source,
    groups: Vec<String>,
    route: Route,
}

#[derive(Debug, Default)]
struct NetState {
    /// Bumped whenever the published source list changes.
    version: u64,
    next_id: u32,
    endpoints: Vec<Endpoint>,
    receivers: Vec<Weak<RecvQueue>>,
}

impl NetState {
    fn publish(&mut self, name: String, groups: Vec<String>, route: Route) -> Option<(u32, Source)> {
        if self.endpoints.iter().any(|e| e.source.name == name) {
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        let source = Source::with_url(name, format!("127.0.0.1:{}", BASE_PORT + id));
        self.endpoints.push(Endpoint {
            id,
            source: source.clone(),
            groups,
            route,
        });
        self.version += 1;
        Some((id, source))
    }

    fn unpublish(&mut self, id: u32) {
        self.endpoints.retain(|e| e.id != id);
        self.version += 1;
    }

    /// Follow routers from `name` to the id of a sender.
    fn resolve(&self, name: &str) -> Option<u32> {
        let mut name = name;
        for _ in 0..MAX_ROUTE_HOPS {
            let endpoint = self.endpoints.iter().find(|e| e.source.name == name)?;
            match &endpoint.route {
                Route::Sender => return Some(endpoint.id),
                Route::Router(target) => name = target.as_deref()?,
            }
        }
        None
    }

    fn live_receivers(&mut self) -> Vec<Arc<RecvQueue>> {
        self.receivers.retain(|r| r.strong_count() > 0);
        self.receivers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Receivers whose source resolves to sender `id`.
    fn receivers_of(&mut self, id: u32) -> Vec<Arc<RecvQueue>> {
        let all = self.live_receivers();
        all.into_iter()
            .filter(|q| self.resolve(&q.source_name) == Some(id))
            .collect()
    }

    /// Receivers connected to `name` itself, without following routes.
    fn subscribers_of(&mut self, name: &str) -> Vec<Arc<RecvQueue>> {
        self.live_receivers()
            .into_iter()
            .filter(|q| q.source_name == name)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Network {
    state: Mutex<NetState>,
    /// Signalled when the source list changes.
    changed: Condvar,
}

/// A self-contained in-process network.
///
/// Sources are named `"<HOST> (<name>)"`; the host defaults to `LOOPBACK`. Tally
/// and connection queries answer immediately regardless of their timeout. Frames
/// are delivered as sent: receiver color formats are not applied.
///
/// ```
/// use std::sync::Arc;
/// use ndi_bridge::{LoopbackBackend, Ndi};
///
/// let ndi = Ndi::with_backend(Arc::new(LoopbackBackend::with_host_name("STUDIO"))).unwrap();
/// assert_eq!(ndi.backend_name(), "loopback");
/// ```
#[derive(Debug)]
pub struct LoopbackBackend {
    host: String,
    net: Arc<Network>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::with_host_name(DEFAULT_HOST)
    }

    pub fn with_host_name<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            net: Arc::default(),
        }
    }

    fn full_name(&self, name: &str) -> String {
        format!("{} ({name})", self.host)
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LoopbackBackend {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn initialize(&self) -> bool {
        true
    }

    fn destroy(&self) {
        debug!(host = %self.host, "loopback network closed");
    }

    fn version(&self) -> String {
        format!("loopback {}", env!("CARGO_PKG_VERSION"))
    }

    fn create_finder(&self, options: &FinderOptions) -> Option<Box<dyn NativeFinder>> {
        Some(Box::new(LoopbackFinder {
            net: Arc::clone(&self.net),
            show_local: options.show_local_sources,
            groups: parse_groups(options.groups.as_deref()),
            seen: AtomicU64::new(0),
        }))
    }

    fn create_receiver(&self, options: &ReceiverOptions) -> Option<Box<dyn NativeReceiver>> {
        let queue = Arc::new(RecvQueue {
            source_name: options.source.name.clone(),
            bandwidth: options.bandwidth,
            state: Mutex::default(),
            ready: Condvar::new(),
        });
        let mut net = lock(&self.net.state);
        net.receivers.push(Arc::downgrade(&queue));
        if net.resolve(&queue.source_name).is_some() {
            queue.push(Packet::StatusChange);
        }
        Some(Box::new(LoopbackReceiver { queue }))
    }

    fn create_sender(&self, options: &SenderOptions) -> Option<Box<dyn NativeSender>> {
        let mut net = lock(&self.net.state);
        let (id, source) = net.publish(
            self.full_name(&options.name),
            parse_groups(options.groups.as_deref()),
            Route::Sender,
        )?;
        for queue in net.receivers_of(id) {
            queue.reconnect(Packet::StatusChange);
        }
        drop(net);
        self.net.changed.notify_all();
        debug!(source = %source.name, "loopback sender published");

        Some(Box::new(LoopbackSender {
            net: Arc::clone(&self.net),
            id,
            source,
            clock_video: options.clock_video,
            clock_audio: options.clock_audio,
            next_video: Mutex::new(None),
            next_audio: Mutex::new(None),
            last_tally: Mutex::default(),
        }))
    }

    fn create_router(&self, options: &RoutingOptions) -> Option<Box<dyn NativeRouter>> {
        let mut net = lock(&self.net.state);
        let (id, source) = net.publish(
            self.full_name(&options.name),
            parse_groups(options.groups.as_deref()),
            Route::Router(None),
        )?;
        drop(net);
        self.net.changed.notify_all();
        debug!(source = %source.name, "loopback router published");

        Some(Box::new(LoopbackRouter {
            net: Arc::clone(&self.net),
            id,
            source,
        }))
    }
}

struct LoopbackFinder {
    net: Arc<Network>,
    show_local: bool,
    groups: Vec<String>,
    /// Network version at the previous successful wait.
    seen: AtomicU64,
}

impl NativeFinder for LoopbackFinder {
    fn wait_for_sources(&self, timeout_ms: u32) -> bool {
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut net = lock(&self.net.state);
        loop {
            if self.seen.swap(net.version, Ordering::AcqRel) != net.version {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            net = self
                .net
                .changed
                .wait_timeout(net, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn current_sources(&self) -> Vec<Source> {
        // Everything on a loopback network is local.
        if !self.show_local {
            return Vec::new();
        }
        lock(&self.net.state)
            .endpoints
            .iter()
            .filter(|e| e.groups.iter().any(|g| self.groups.contains(g)))
            .map(|e| e.source.clone())
            .collect()
    }
}

struct LoopbackReceiver {
    queue: Arc<RecvQueue>,
}

impl NativeReceiver for LoopbackReceiver {
    fn capture(&self, timeout_ms: u32) -> RawCapture {
        self.queue.take(timeout_ms)
    }

    fn set_tally(&self, tally: Tally) -> bool {
        lock(&self.queue.state).tally = tally;
        true
    }

    fn create_framesync(&self) -> Option<Box<dyn NativeFrameSync>> {
        Some(Box::new(LoopbackFrameSync {
            queue: Arc::clone(&self.queue),
            state: Mutex::default(),
        }))
    }
}

struct LoopbackSender {
    net: Arc<Network>,
    id: u32,
    source: Source,
    clock_video: bool,
    clock_audio: bool,
    next_video: Mutex<Option<Instant>>,
    next_audio: Mutex<Option<Instant>>,
    /// Aggregate tally reported by the previous poll.
    last_tally: Mutex<Tally>,
}

impl LoopbackSender {
    fn fan_out(&self, packet: Packet) {
        let targets = lock(&self.net.state).receivers_of(self.id);
        trace!(source = %self.source.name, receivers = targets.len(), "loopback send");
        for queue in targets {
            queue.push(packet.clone());
        }
    }
}

impl NativeSender for LoopbackSender {
    fn send_video(&self, frame: &SendVideo<'_>) -> bool {
        if self.clock_video && frame.frame_rate_n > 0 && frame.frame_rate_d > 0 {
            let period = f64::from(frame.frame_rate_d) / f64::from(frame.frame_rate_n);
            pace(&self.next_video, Duration::from_secs_f64(period));
        }
        let (timecode, timestamp) = stamp(frame.timecode);
        self.fan_out(Packet::Video(VideoPacket {
            xres: frame.xres,
            yres: frame.yres,
            fourcc: frame.fourcc,
            frame_rate_n: frame.frame_rate_n,
            frame_rate_d: frame.frame_rate_d,
            picture_aspect_ratio: frame.picture_aspect_ratio,
            frame_format_type: frame.frame_format_type,
            timecode,
            timestamp,
            line_stride_or_size: frame.line_stride_or_size,
            metadata: frame.metadata.map(str::to_owned),
            data: Arc::from(frame.data),
        }));
        true
    }

    fn send_audio(&self, frame: &SendAudio<'_>) -> bool {
        if self.clock_audio && frame.sample_rate > 0 {
            let period = f64::from(frame.samples) / f64::from(frame.sample_rate);
            pace(&self.next_audio, Duration::from_secs_f64(period));
        }
        let (timecode, timestamp) = stamp(frame.timecode);
        self.fan_out(Packet::Audio(AudioPacket {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            samples: frame.samples,
            channel_stride_in_bytes: frame.channel_stride_in_bytes,
            timecode,
            timestamp,
            metadata: frame.metadata.map(str::to_owned),
            data: Arc::from(frame.data),
        }));
        true
    }

    fn send_metadata(&self, data: &str, timecode: i64) -> bool {
        let (timecode, timestamp) = stamp(timecode);
        self.fan_out(Packet::Metadata(RawMetadataFrame {
            data: data.to_owned(),
            timecode,
            timestamp,
        }));
        true
    }

    fn tally(&self, _timeout_ms: u32) -> (bool, Tally) {
        let receivers = lock(&self.net.state).receivers_of(self.id);
        let current = receivers.iter().map(|q| q.tally()).fold(Tally::default(), |acc, t| {
            Tally::new(acc.on_program || t.on_program, acc.on_preview || t.on_preview)
        });
        let mut last = lock(&self.last_tally);
        let changed = *last != current;
        *last = current;
        (changed, current)
    }

    fn connections(&self, _timeout_ms: u32) -> i32 {
        lock(&self.net.state).receivers_of(self.id).len() as i32
    }

    fn source(&self) -> Source {
        self.source.clone()
    }
}

impl Drop for LoopbackSender {
    fn drop(&mut self) {
        let mut net = lock(&self.net.state);
        let affected = net.receivers_of(self.id);
        net.unpublish(self.id);
        drop(net);
        for queue in &affected {
            queue.disconnect();
        }
        self.net.changed.notify_all();
        debug!(source = %self.source.name, receivers = affected.len(), "loopback sender withdrawn");
    }
}

struct LoopbackRouter {
    net: Arc<Network>,
    id: u32,
    source: Source,
}

impl LoopbackRouter {
    fn retarget(&self, target: Option<String>) -> bool {
        let mut net = lock(&self.net.state);
        let Some(endpoint) = net.endpoints.iter_mut().find(|e| e.id == self.id) else {
            return false;
        };
        endpoint.route = Route::Router(target);
        let subscribers = net.subscribers_of(&self.source.name);
        drop(net);
        for queue in subscribers {
            queue.reconnect(Packet::SourceChange);
        }
        true
    }
}

impl NativeRouter for LoopbackRouter {
    fn change(&self, source: &Source) -> bool {
        self.retarget(Some(source.name.clone()))
    }

    fn clear(&self) -> bool {
        self.retarget(None)
    }

    fn connections(&self, _timeout_ms: u32) -> i32 {
        lock(&self.net.state).subscribers_of(&self.source.name).len() as i32
    }

    fn source(&self) -> Source {
        self.source.clone()
    }
}

impl Drop for LoopbackRouter {
    fn drop(&mut self) {
        let mut net = lock(&self.net.state);
        let subscribers = net.subscribers_of(&self.source.name);
        net.unpublish(self.id);
        drop(net);
        for queue in subscribers {
            queue.disconnect();
        }
        self.net.changed.notify_all();
    }
}

#[derive(Debug, Default)]
struct SyncState {
    video: Option<VideoPacket>,
    /// One FIFO per source channel.
    audio: Vec<VecDeque<f32>>,
    sample_rate: i32,
}

impl SyncState {
    fn absorb(&mut self, packets: Vec<Packet>) {
        for packet in packets {
            match packet {
                Packet::Video(video) => self.video = Some(video),
                Packet::Audio(audio) => self.push_audio(&audio),
                _ => {}
            }
        }
    }

    fn push_audio(&mut self, audio: &AudioPacket) {
        let channels = audio.channels.max(0) as usize;
        if channels != self.audio.len() || audio.sample_rate != self.sample_rate {
            self.audio = vec![VecDeque::new(); channels];
            self.sample_rate = audio.sample_rate;
        }
        let stride = audio.channel_stride_in_bytes.max(0) as usize;
        let samples = audio.samples.max(0) as usize;
        let cap = self.sample_rate.max(1) as usize * MAX_BUFFERED_SECONDS;
        for (ch, fifo) in self.audio.iter_mut().enumerate() {
            let start = ch * stride;
            let Some(bytes) = audio.data.get(start..start + samples * 4) else {
                continue;
            };
            fifo.extend(convert::f32_samples(bytes));
            let excess = fifo.len().saturating_sub(cap);
            fifo.drain(..excess);
        }
    }

    fn depth(&self) -> usize {
        self.audio.first().map_or(0, VecDeque::len)
    }
}

struct LoopbackFrameSync {
    queue: Arc<RecvQueue>,
    state: Mutex<SyncState>,
}

impl LoopbackFrameSync {
    fn refreshed(&self) -> MutexGuard<'_, SyncState> {
        let mut state = lock(&self.state);
        state.absorb(self.queue.drain());
        state
    }
}

impl NativeFrameSync for LoopbackFrameSync {
    fn capture_video(&self, _field: ScanType) -> Option<RawVideoFrame> {
        self.refreshed().video.as_ref().map(VideoPacket::to_raw)
    }

    fn capture_audio(&self, sample_rate: i32, channels: i32, samples: i32) -> RawAudioFrame {
        let mut state = self.refreshed();
        let source_rate = if state.sample_rate > 0 {
            state.sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        let source_channels = if state.audio.is_empty() {
            DEFAULT_CHANNELS
        } else {
            state.audio.len() as i32
        };
        let rate = if sample_rate > 0 { sample_rate } else { source_rate };
        let channels = if channels > 0 { channels } else { source_channels };
        let out_samples = samples.max(0) as usize;

        // Source samples covering the requested duration.
        let consumed =
            (out_samples as f64 * f64::from(source_rate) / f64::from(rate)).round() as usize;
        let taken: Vec<Vec<f32>> = state
            .audio
            .iter_mut()
            .map(|fifo| {
                let n = consumed.min(fifo.len());
                fifo.drain(..n).collect()
            })
            .collect();
        drop(state);

        let planar = convert::resample_planar(&taken, channels as usize, out_samples, consumed);
        let timestamp = now_ticks();
        RawAudioFrame {
            sample_rate: rate,
            channels,
            samples: out_samples as i32,
            fourcc: FOURCC_AUDIO_FLTP,
            channel_stride_in_bytes: (out_samples * 4) as i32,
            timecode: timestamp,
            timestamp,
            metadata: None,
            buffer: FrameBuffer::new(
                planar
                    .iter()
                    .flat_map(|s| s.to_ne_bytes())
                    .collect::<Vec<u8>>(),
            ),
        }
    }

    fn audio_queue_depth(&self) -> i32 {
        self.refreshed().depth() as i32
    }
}
