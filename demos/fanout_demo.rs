//! Fan-out demo - one publisher, an early and a late subscriber
//!
//! Run with: cargo run --example fanout_demo
//!
//! This demo shows:
//! - Driving a stream with `PublishSession` from a channel of packets
//! - A subscriber attached from the start receiving every packet
//! - A late subscriber starting on the cached keyframe
//!
//! ```text
//!   synthetic encoder ──► PublishSession ──► StreamRegistry ──┬──► early
//!                                                             └──► late
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use rtmp_fanout::media::Packet;
use rtmp_fanout::session::PublishSession;
use rtmp_fanout::sink::ChannelSink;
use rtmp_fanout::{RegistryConfig, StreamKey, StreamRegistry};

/// Frames per GOP of the synthetic encoder
const GOP_SIZE: u32 = 25;
/// Milliseconds per frame (40 = 25 fps)
const FRAME_MS: u32 = 40;

fn synthetic_frame(n: u32) -> Packet {
    let keyframe = n % GOP_SIZE == 0;
    let header = if keyframe { 0x17 } else { 0x27 };
    Packet::video(n * FRAME_MS, Bytes::from(vec![header, 0x01, 0, 0, 0, n as u8]), keyframe)
}

async fn print_packets(name: &'static str, mut rx: mpsc::Receiver<Packet>) {
    let mut count = 0;
    while let Some(packet) = rx.recv().await {
        count += 1;
        if packet.is_keyframe || packet.is_header || packet.is_metadata() {
            println!(
                "[{name}] ts={:>5} kind={:?} keyframe={} header={}",
                packet.timestamp, packet.kind, packet.is_keyframe, packet.is_header
            );
        }
    }
    println!("[{name}] stream ended after {count} packets");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rtmp_fanout=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RegistryConfig::default().gop_num(1);
    let registry = Arc::new(StreamRegistry::try_with_config(config)?);
    let key = StreamKey::new("live", "demo");

    let (encoder, packets) = mpsc::channel(64);
    let session = PublishSession::new(Arc::clone(&registry), key.clone());
    let publisher = tokio::spawn(async move { session.run(packets).await });

    // Wait for the stream to be registered
    while !registry.has_active_stream(&key).await {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    encoder
        .send(Packet::metadata(Bytes::from_static(b"\x02\x00\x0aonMetaData")))
        .await?;
    encoder
        .send(Packet::video(0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]), true).header())
        .await?;

    let (early, early_rx) = ChannelSink::new(256);
    registry.attach(&key, early).await?;
    let early_task = tokio::spawn(print_packets("early", early_rx));

    for n in 0..60 {
        encoder.send(synthetic_frame(n)).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // Joins mid-GOP; replay starts on frame 50
    let (late, late_rx) = ChannelSink::new(256);
    registry.attach(&key, late).await?;
    let late_task = tokio::spawn(print_packets("late", late_rx));

    for n in 60..80 {
        encoder.send(synthetic_frame(n)).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    if let Some(stats) = registry.get_stream_stats(&key).await {
        println!(
            "stats: subscribers={} gops={} cached_packets={} dispatched={}",
            stats.subscriber_count,
            stats.gop_count,
            stats.gop_packet_count,
            stats.packets_dispatched
        );
    }

    drop(encoder);
    let summary = publisher.await??;
    println!("published {} packets ({} bytes)", summary.packets, summary.bytes);

    early_task.await?;
    late_task.await?;
    Ok(())
}
