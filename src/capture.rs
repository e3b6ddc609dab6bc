//! Bounded-wait capture loop.
//!
//! A capture call asks the native layer for "the next frame of any kind" in wait
//! slices. The loop classifies each result:
//!
//! - the requested kind ends the wait (`Matched`),
//! - another frame kind is dropped on the spot, which frees the native buffer, and
//!   the wait continues with whatever budget is left,
//! - "nothing in this slice" recomputes the budget from a monotonic clock anchored at
//!   loop entry and ends the wait once it is spent (`TimedOut`),
//! - a transport error ends the wait immediately (`ConnectionLost`).
//!
//! A timeout of zero means no deadline; slices repeat until something arrives.

use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::trace;

use crate::{
    sys::{RawAudioFrame, RawCapture, RawMetadataFrame, RawVideoFrame},
    Error, Result,
};

/// Longest single native wait. Liveness of the handle is re-checked between slices.
pub(crate) const CAPTURE_SLICE_MS: u32 = 1000;

/// The frame kind a format-specific capture is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wanted {
    Video,
    Audio,
    Metadata,
}

impl fmt::Display for Wanted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Wanted::Video => "video",
            Wanted::Audio => "audio",
            Wanted::Metadata => "metadata",
        })
    }
}

#[derive(Debug)]
pub(crate) enum Captured {
    Video(RawVideoFrame),
    Audio(RawAudioFrame),
    Metadata(RawMetadataFrame),
}

/// Remaining-time bookkeeping for one capture call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub(crate) fn new(timeout_ms: u32) -> Self {
        Self {
            start: Instant::now(),
            budget: (timeout_ms > 0).then(|| Duration::from_millis(u64::from(timeout_ms))),
        }
    }

    /// Length of the next native wait, or `None` once the budget is spent.
    pub(crate) fn next_slice(&self) -> Option<u32> {
        let Some(budget) = self.budget else {
            return Some(CAPTURE_SLICE_MS);
        };
        let remaining = budget.checked_sub(self.start.elapsed())?;
        if remaining.is_zero() {
            return None;
        }
        let ms = remaining.as_micros().div_ceil(1000);
        Some(ms.min(u128::from(CAPTURE_SLICE_MS)) as u32)
    }
}

fn timed_out(what: impl fmt::Display) -> Error {
    Error::TimedOut(format!(
        "No {what} data received in the requested time interval."
    ))
}

fn connection_lost(what: impl fmt::Display) -> Error {
    Error::ConnectionLost(format!(
        "Received error response from NDI {what} request. Connection lost."
    ))
}

/// Wait for a frame of kind `wanted`.
///
/// `capture` performs one native wait of the given slice length. Errors it returns
/// (for example a destroyed handle) end the loop unchanged.
pub(crate) fn capture_until<F>(mut capture: F, wanted: Wanted, timeout_ms: u32) -> Result<Captured>
where
    F: FnMut(u32) -> Result<RawCapture>,
{
    let deadline = Deadline::new(timeout_ms);
    loop {
        let Some(slice) = deadline.next_slice() else {
            return Err(timed_out(wanted));
        };
        match capture(slice)? {
            RawCapture::Video(frame) if wanted == Wanted::Video => {
                return Ok(Captured::Video(frame))
            }
            RawCapture::Audio(frame) if wanted == Wanted::Audio => {
                return Ok(Captured::Audio(frame))
            }
            RawCapture::Metadata(frame) if wanted == Wanted::Metadata => {
                return Ok(Captured::Metadata(frame))
            }
            RawCapture::Error => return Err(connection_lost(wanted)),
            RawCapture::None => {}
            other => {
                trace!(?wanted, discarded = kind_name(&other), "dropping unrequested frame");
                drop(other);
            }
        }
    }
}

/// Wait for whatever arrives first.
///
/// Returns `RawCapture::None` when the budget runs out; never returns
/// `RawCapture::Error`, which is mapped to [`Error::ConnectionLost`].
pub(crate) fn capture_any<F>(mut capture: F, timeout_ms: u32) -> Result<RawCapture>
where
    F: FnMut(u32) -> Result<RawCapture>,
{
    let deadline = Deadline::new(timeout_ms);
    while let Some(slice) = deadline.next_slice() {
        match capture(slice)? {
            RawCapture::None => continue,
            RawCapture::Error => return Err(connection_lost("data")),
            frame => return Ok(frame),
        }
    }
    Ok(RawCapture::None)
}

fn kind_name(capture: &RawCapture) -> &'static str {
    match capture {
        RawCapture::None => "none",
        RawCapture::Video(_) => "video",
        RawCapture::Audio(_) => "audio",
        RawCapture::Metadata(_) => "metadata",
        RawCapture::SourceChange => "sourceChange",
        RawCapture::StatusChange => "statusChange",
        RawCapture::Error => "error",
    }
}
