//! Async, handle-safe bridge over the NDI® 6 SDK (Network Device Interface).
//!
//! This crate wraps the SDK's finder, receiver, sender, frame synchronizer and
//! routing objects behind reference-counted handles that can be shared across
//! tasks, destroyed explicitly, and are released automatically when the last
//! clone goes away. Blocking SDK calls run on tokio's blocking pool so they never
//! stall the async executor.
//!
//! # Quick Start
//!
//! ```no_run
//! use ndi_bridge::{FinderOptions, Ndi, ReceiverOptions};
//!
//! # async fn run() -> Result<(), ndi_bridge::Error> {
//! // The loopback backend is an in-process network; `Ndi::new()` uses the SDK.
//! let ndi = Ndi::loopback()?;
//!
//! let finder = ndi.open_finder(FinderOptions::builder().build()).await?;
//! finder.wait(5000).await?;
//!
//! for source in finder.sources()? {
//!     println!("Found: {source}");
//!     let receiver = ndi.open_receiver(ReceiverOptions::builder(source).build()?).await?;
//!     let frame = receiver.video(5000).await?;
//!     println!("{}x{}", frame.xres, frame.yres);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! ## Runtime Management
//!
//! [`Ndi`] is a reference on a runtime. The first reference initializes the backend
//! and the last one tears it down. Every handle keeps its own reference, so the
//! runtime outlives all of them.
//!
//! ## Handles
//!
//! [`Finder`], [`Receiver`], [`Sender`], [`FrameSync`] and [`Routing`] are cheap
//! to clone. `destroy()` releases the native object once; later calls on any clone
//! fail with [`Error::Destroyed`]. A receiver wrapped by a frame synchronizer
//! refuses to be destroyed with [`Error::HandleInUse`] until the synchronizer is.
//!
//! ## Capture
//!
//! Receiver capture calls wait in one-second slices so that a destroy is noticed
//! promptly, and a timeout of `0` waits forever. Frames are copied out of SDK memory
//! before the call returns.
//!
//! # Backends
//!
//! - **loopback** (always available): an in-process network used by tests and for
//!   wiring pipelines without hardware.
//! - **ndi** (`native` feature): the NDI SDK through bindgen-generated FFI.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Internal modules
mod backend;
mod capture;
mod convert;
mod dispatch;
mod error;
mod handle;
mod marshal;
#[cfg(feature = "native")]
mod ndi_lib;

// Public modules
pub mod finder;
pub mod frames;
pub mod framesync;
pub mod receiver;
pub mod routing;
pub mod runtime;
pub mod sender;
pub mod sys;

// Re-exports
pub use {
    backend::LoopbackBackend,
    error::{Error, ErrorKind},
    finder::{Finder, FinderOptions, FinderOptionsBuilder, Source},
    frames::{
        calculate_line_stride, AudioCaptureOptions, AudioFormat, AudioFrame,
        AudioFrameBuilder, Frame, FrameKind, FrameTime, LineStrideOrSize, MetadataFrame,
        PixelFormat, ScanType, VideoFrame, VideoFrameBuilder, DEFAULT_REFERENCE_LEVEL_DB,
        TICKS_PER_SECOND,
    },
    framesync::FrameSync,
    handle::HandleKind,
    receiver::{
        Receiver, ReceiverOptions, ReceiverOptionsBuilder, RecvBandwidth, RecvColorFormat,
        Tally,
    },
    routing::{Routing, RoutingOptions, RoutingOptionsBuilder},
    runtime::Ndi,
    sender::{Sender, SenderOptions, SenderOptionsBuilder, TallyState},
};

#[cfg(feature = "native")]
pub use backend::NdiBackend;

/// Alias for Result with our Error type
pub type Result<T> = std::result::Result<T, crate::error::Error>;

// Tests
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
