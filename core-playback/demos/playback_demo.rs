//! # Chunked Playback Demo
//!
//! Plays a chunk list described in a JSON file through the headless
//! `TimedAudioOutput`, printing engine events as they arrive.
//!
//! ```json
//! [
//!   { "id": "a", "locator": "chunks/000.mp3", "sequence": 0, "nominal_duration": 30.0 },
//!   { "id": "b", "locator": "chunks/001.mp3", "sequence": 1, "nominal_duration": 12.5, "is_final": true }
//! ]
//! ```
//!
//! Locators starting with `http` are fetched over HTTP; anything else is read
//! from disk relative to the JSON file.
//!
//! Run with: `cargo run --example playback_demo --package core-playback --features core-decoder -- chunks.json 10`

use anyhow::{bail, Context};
use bridge_desktop::{FileChunkFetcher, HttpChunkFetcher, TimedAudioOutput};
use bridge_traits::ChunkFetcher;
use core_playback::{ChunkDescriptor, EngineConfig, PlaybackEngine, SymphoniaChunkDecoder};
use core_runtime::events::{CoreEvent, PlaybackEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        bail!("usage: playback_demo <descriptors.json> [speed]");
    };
    let speed: f64 = match args.next() {
        Some(raw) => raw.parse().context("speed must be a number")?,
        None => 1.0,
    };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let descriptors: Vec<ChunkDescriptor> =
        serde_json::from_str(&raw).context("parsing chunk descriptors")?;

    let remote = descriptors
        .first()
        .map_or(false, |d| d.locator.starts_with("http"));
    let fetcher: Arc<dyn ChunkFetcher> = if remote {
        Arc::new(HttpChunkFetcher::new()?)
    } else {
        let root = path.parent().map(PathBuf::from).unwrap_or_default();
        Arc::new(FileChunkFetcher::with_root(root))
    };

    let core = CoreConfig::builder()
        .fetcher(fetcher)
        .decoder(Arc::new(SymphoniaChunkDecoder::new()))
        .output(Arc::new(TimedAudioOutput::with_speed(speed)))
        .build()?;

    let engine = PlaybackEngine::new(&core, EngineConfig::default())?;
    let mut events = engine.subscribe();

    engine.load_session(descriptors).await?;
    let state = engine.state();
    println!(
        "Loaded {} chunks, {:.1}s total{}",
        state.chunk_count,
        state.total_duration,
        if state.is_live { " (live)" } else { "" }
    );

    engine.play().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event? {
                CoreEvent::Playback(PlaybackEvent::Completed { total_duration_ms }) => {
                    println!("Completed after {:.1}s of media", total_duration_ms as f64 / 1000.0);
                    break;
                }
                CoreEvent::Playback(PlaybackEvent::Error { message, recoverable: false, .. }) => {
                    println!("Playback failed: {}", message);
                    break;
                }
                event => println!("[{:?}] {}", event.severity(), event.description()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
        }
    }

    let state = engine.state();
    println!(
        "Position {:.1}s, skipped {}, stalls {}",
        state.position, state.skip_count, state.stall_count
    );
    engine.dispose().await?;
    Ok(())
}
