#![allow(dead_code)]

use ndi_bridge::{Error, Ndi, Receiver, ReceiverOptions, Sender, SenderOptions, Source};

/// Route crate logs to the test harness. `RUST_LOG=ndi_bridge=trace` for detail.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ndi_bridge=info".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

pub fn loopback() -> Result<Ndi, Error> {
    init_tracing();
    Ndi::loopback()
}

pub async fn sender(ndi: &Ndi, name: &str) -> Result<Sender, Error> {
    ndi.open_sender(SenderOptions::builder(name).clock_video(false).build()?)
        .await
}

pub async fn receiver(ndi: &Ndi, source: Source) -> Result<Receiver, Error> {
    ndi.open_receiver(ReceiverOptions::builder(source).build()?)
        .await
}
