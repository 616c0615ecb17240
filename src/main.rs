// Replays a recorded observation log through the mosaic pipeline and writes every
// composite it produces as a PNG file.
//
// The log is newline-delimited JSON, one `Observation` per line. Blank lines and lines
// starting with `#` are skipped.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tile_mosaic::core_modules::utils::image_helper::image_helper::{composite_path, save};
use tile_mosaic::{
    Direction, IndexedPalette, MosaicConfig, MosaicEvent, MosaicPipeline, Observation, PixelExtractor,
    RasterOps, RawRgba,
};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser, Debug)]
#[command(name = "mosaic_replay", version, about = "Rebuild composite images from a tile observation log")]
struct Args {
    /// Newline-delimited JSON observation log.
    input: PathBuf,

    /// Directory the composite PNGs are written to.
    #[arg(short, long, default_value = "composites")]
    output: PathBuf,

    /// Edge length of one tile in pixels.
    #[arg(long, default_value_t = 128)]
    tile_size: u32,

    /// Quiet period before a recomputation pass, in milliseconds.
    #[arg(long, default_value_t = 10)]
    debounce_ms: u64,

    /// Largest per-axis gap between tiles of one composite.
    #[arg(long, default_value_t = 1)]
    link_distance: u32,

    /// Delay between replayed observations, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,

    /// JSON file with an array of [r, g, b, a] colors. Payloads are then palette indices.
    #[arg(long)]
    palette: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)?;

    let extractor: Arc<dyn PixelExtractor> = match &args.palette {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading palette {}", path.display()))?;
            let colors: Vec<[u8; 4]> = serde_json::from_str(&raw).context("parsing palette")?;
            info!("using {} color palette from {}", colors.len(), path.display());
            Arc::new(IndexedPalette::new(colors))
        }
        None => Arc::new(RawRgba),
    };

    let config = MosaicConfig {
        tile_size: args.tile_size,
        debounce: Duration::from_millis(args.debounce_ms),
        link_distance: args.link_distance,
        ..MosaicConfig::default()
    };

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    let (handle, events) = MosaicPipeline::spawn_with(config, Arc::new(RasterOps), extractor);
    let writer = tokio::spawn(write_composites(events, args.output.clone()));

    let log = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("reading observation log {}", args.input.display()))?;

    let mut replayed = 0usize;
    for (index, line) in log.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<Observation>(line) {
            Ok(observation) => match handle.observe(observation).await {
                Ok(_) => replayed += 1,
                Err(e) => warn!("line {}: {}", index + 1, e),
            },
            Err(e) => warn!("line {}: skipping malformed observation: {}", index + 1, e),
        }

        if args.pace_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.pace_ms)).await;
        }
    }

    handle.drain().await?;
    let stats = handle.stats().await?;
    drop(handle);

    let written = writer.await??;
    info!(
        "replayed {} observations in {} passes: {} composed, {} deferred, {} unchanged, {} failed",
        replayed, stats.passes, stats.emitted, stats.deferred, stats.deduped, stats.failed
    );
    println!(
        "Replay complete. {} composites saved to {}",
        written,
        args.output.display()
    );
    Ok(())
}

/// Drains pipeline events until the pipeline stops, saving each composite.
async fn write_composites(mut events: UnboundedReceiver<MosaicEvent>, dir: PathBuf) -> Result<usize> {
    let mut per_direction: HashMap<Direction, usize> = HashMap::new();
    let mut written = 0;

    while let Some(event) = events.recv().await {
        match event {
            MosaicEvent::Composite(composite) => {
                let index = per_direction.entry(composite.direction).or_default();
                let path = composite_path(&dir, composite.direction, *index);
                *index += 1;

                let image = composite.image;
                let path = tokio::task::spawn_blocking(move || save(&path, &image).map(|_| path))
                    .await?
                    .context("saving composite")?;
                info!("wrote {}", path.display());
                written += 1;
            }
            MosaicEvent::Failed { direction, error, .. } => {
                error!("{}: {}", direction, error);
            }
        }
    }

    Ok(written)
}
