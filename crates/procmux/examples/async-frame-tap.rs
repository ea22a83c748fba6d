//! Async frame tap: speaks the channel protocol from tokio with `ChannelCodec`.
//!
//! A blocking hub runs on a background thread; the async side performs the
//! `Connect` handshake by hand and prints every frame it receives.
//!
//! Run with:
//!   cargo run --example async-frame-tap --features async

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use procmux::channel::{Channel, ChannelConfig, ChannelListener, ChannelRegistry};
use procmux::frame::{ChannelCodec, Frame, FrameType};
use procmux::transport::Endpoint;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

const TAP_ID: i64 = 7;
const SENDER_ID: i64 = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub_registry = Arc::new(ChannelRegistry::new());
    let listener = ChannelListener::bind(&Endpoint::tcp("127.0.0.1", 0), Arc::clone(&hub_registry))?;
    let endpoint = listener.local_endpoint();
    std::thread::spawn(move || {
        while listener.accept().is_ok() {}
    });

    let Endpoint::Tcp(addr) = &endpoint else {
        return Err("expected a tcp endpoint".into());
    };
    let stream = TcpStream::connect(addr.as_str()).await?;
    let mut framed = Framed::new(stream, ChannelCodec::default());

    framed.send(Frame::connect(TAP_ID)).await?;
    match framed.next().await {
        Some(Ok(frame)) if frame.frame_type == FrameType::ConnectAck => {
            eprintln!("[tap] connected as {}", frame.announced_id().unwrap_or_default());
        }
        other => return Err(format!("unexpected handshake reply: {other:?}").into()),
    }

    // A blocking client relays two payloads to the tap.
    let sender = tokio::task::spawn_blocking(move || -> Result<(), procmux::channel::ChannelError> {
        let registry = Arc::new(ChannelRegistry::new());
        let channel = Channel::connect(&endpoint, SENDER_ID, &registry, ChannelConfig::default(), None)?;
        channel.send_to_channel(TAP_ID, b"first")?;
        channel.send_to_channel(TAP_ID, b"second")?;
        std::thread::sleep(Duration::from_millis(100));
        channel.close();
        Ok(())
    });

    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), framed.next())
            .await?
            .ok_or("hub closed the tap")??;
        eprintln!(
            "[tap] {} from={} to={} payload={}",
            frame.frame_type,
            frame.from,
            frame.to,
            String::from_utf8_lossy(&frame.payload)
        );
    }

    sender.await??;
    hub_registry.close_all();
    Ok(())
}
