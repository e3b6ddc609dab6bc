//! Transport implementations behind [`Backend`](crate::sys::Backend).

mod loopback;
#[cfg(feature = "native")]
mod ndi;

pub use loopback::LoopbackBackend;
#[cfg(feature = "native")]
pub use ndi::NdiBackend;
