//! # Playback Controller Demo
//!
//! Drives a session against the simulated engine: prepare, play, seek,
//! a network stall, a rate change and completion.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use bridge_simulated::{SimulatedEngineConfig, SimulatedEngineFactory};
use bridge_traits::{MediaSource, SeekMode};
use core_playback::{PlaybackController, PlaybackState, PlayerEvent};
use core_runtime::config::{PlaybackTuning, PlayerConfig};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_filter("core_playback=info,bridge_simulated=info"),
    )?;

    let engine = SimulatedEngineConfig::default()
        .with_duration(Some(Duration::from_secs(2)))
        .with_frame_interval(Duration::from_millis(20));
    let factory = Arc::new(SimulatedEngineFactory::new(engine));
    let network = factory.network().clone();

    let config = PlayerConfig::builder()
        .engine_factory(factory)
        .tuning(PlaybackTuning::streaming())
        .enable_event_bus(true)
        .build()?;
    let controller = PlaybackController::new(config)?;

    controller.set_observer(Some(Arc::new(|event: PlayerEvent| match event {
        PlayerEvent::PositionChanged { .. } => {}
        event => println!("event: {:?}", event),
    })));

    if let Some(mut stream) = controller.subscribe() {
        tokio::spawn(async move {
            while let Ok(event) = stream.recv().await {
                if let PlayerEvent::PositionChanged { position, .. } = event {
                    if position.as_millis() % 500 == 0 {
                        println!("position: {:?}", position);
                    }
                }
            }
        });
    }

    controller
        .set_source(MediaSource::remote(
            "https://cdn.example.com/vod/demo.m3u8?token=secret",
        ))
        .await?;
    controller.prepare_and_wait().await?;
    println!(
        "prepared: duration {:?}, tracks {}",
        controller.duration(),
        controller.snapshot().tracks.len()
    );

    controller.play().await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    controller
        .seek(Duration::from_millis(800), SeekMode::Closest)
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("simulating network stall");
    network.set_cache_percent(5);
    tokio::time::sleep(Duration::from_millis(200)).await;
    network.set_cache_percent(100);

    controller.set_rate(2.0).await?;
    controller
        .wait_for_state(PlaybackState::PlaybackCompleted, Duration::from_secs(5))
        .await?;

    println!("final snapshot: {:?}", controller.snapshot());
    controller.release().await?;
    Ok(())
}
