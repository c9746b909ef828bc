//! opz-export - OP-Z drum pack export tool
//!
//! Slices up to 24 audio files into one drum pack (.aif) with device metadata.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opz_drum::{PositionCodec, SlicePlan, read_drum_metadata, validate};
use std::path::{Path, PathBuf};

use opz_export::manifest;
use opz_export::pack::PackBuilder;

#[derive(Parser)]
#[command(name = "opz-export")]
#[command(about = "OP-Z drum pack export tool")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a drum pack from a manifest file
    Build {
        /// Path to pack.toml manifest
        #[arg(default_value = "pack.toml")]
        manifest: PathBuf,

        /// Output file (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate manifest without building
    Check {
        /// Path to pack.toml manifest
        #[arg(default_value = "pack.toml")]
        manifest: PathBuf,
    },

    /// Show the chunk layout and slice table of a drum pack
    Inspect {
        /// Input .aif file
        input: PathBuf,

        /// Position ticks per frame
        #[arg(long, default_value_t = opz_drum::DEFAULT_POSITION_SCALE)]
        scale: u32,
    },

    /// Print the slice plan for a list of frame counts
    Plan {
        /// Frame count per slice, in slot order
        #[arg(required = true)]
        frames: Vec<u64>,

        /// Position ticks per frame
        #[arg(long, default_value_t = opz_drum::DEFAULT_POSITION_SCALE)]
        scale: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Build { manifest, output } => {
            tracing::info!("Building drum pack from {:?}", manifest);
            build(&manifest, output)?;
            tracing::info!("Build complete!");
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            manifest::validate(&config)?;
            tracing::info!("Manifest is valid!");
        }

        Commands::Inspect { input, scale } => inspect(&input, scale)?,

        Commands::Plan { frames, scale } => print_plan(&frames, scale),
    }

    Ok(())
}

fn build(path: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = manifest::load_manifest(path)?;
    manifest::validate(&config)?;
    let options = config.pack_options()?;
    let output = output.unwrap_or_else(|| config.output_path());
    let segments = config.slice_paths();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let builder = PackBuilder::new(config.pack.transcoder.create());
        let result = builder.build(&segments, &options).await;
        if let Err(e) = builder.close().await {
            tracing::warn!("Failed to shut down transcoder: {}", e);
        }
        let pack = result?;

        pack.write_to(&output)
            .await
            .with_context(|| format!("Failed to write pack: {:?}", output))?;
        tracing::info!("Wrote {:?} ({}, {} bytes)", output, pack.mime(), pack.bytes.len());
        Ok::<_, anyhow::Error>(())
    })
}

fn inspect(path: &Path, scale: u32) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let layout = validate(&bytes).with_context(|| format!("Invalid container: {:?}", path))?;

    println!(
        "{:?}: {:?}, {} bytes, {} ch, {} bit, {} Hz, {} frames",
        path,
        layout.format,
        layout.form_end(),
        layout.common.channels,
        layout.common.sample_size,
        layout.common.sample_rate,
        layout.common.sample_frames
    );
    for chunk in &layout.chunks {
        println!(
            "  {:>8}  {}  {} bytes",
            chunk.offset,
            String::from_utf8_lossy(&chunk.id),
            chunk.size
        );
    }

    let codec = PositionCodec::new(scale);
    let Some(meta) = read_drum_metadata(&bytes, &codec)? else {
        println!("No drum metadata");
        return Ok(());
    };

    println!(
        "Drum metadata: name {:?}, version {:?}, octave {:?}",
        meta.name.as_deref().unwrap_or(""),
        meta.drum_version,
        meta.octave
    );
    println!("  slot       start         end    frames");
    for slice in &meta.slices {
        println!(
            "  {:>4}  {:>10}  {:>10}  {:>8}",
            slice.slot + 1,
            slice.start,
            slice.end,
            slice.frames()
        );
    }
    for (a, b) in meta.overlaps() {
        println!("  warning: slots {} and {} overlap", a + 1, b + 1);
    }
    for (a, b) in meta.gaps() {
        println!("  warning: gap between slots {} and {}", a + 1, b + 1);
    }
    for slot in meta.out_of_bounds() {
        println!("  warning: slot {} ends past the sound data", slot + 1);
    }

    Ok(())
}

fn print_plan(frames: &[u64], scale: u32) {
    let plan = SlicePlan::from_frame_counts(frames);
    let codec = PositionCodec::new(scale);
    if frames.len() > opz_drum::MAX_SLICES {
        tracing::warn!(
            "{} frame counts given, only the first {} are used",
            frames.len(),
            opz_drum::MAX_SLICES
        );
    }

    println!("  slot       start         end    start pos      end pos");
    for slot in 0..opz_drum::MAX_SLICES {
        let (start, end) = (plan.start[slot], plan.end[slot]);
        println!(
            "  {:>4}  {:>10}  {:>10}  {:>11}  {:>11}",
            slot + 1,
            start,
            end,
            codec.encode_one(i64::try_from(start).unwrap_or(i64::MAX)),
            codec.encode_one(i64::try_from(end).unwrap_or(i64::MAX))
        );
    }
}
