use anyhow::{Result, bail};
use blockseg::{
    config::JobConfig,
    executor::TaskPool,
    pipeline::SegmentationPipeline,
    segmentation::FloodFillSegmenter,
    store::FsBlockStore,
};
use clap::Parser;
use log::info;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    about = "Segments a blocked volume and stitches the per-block labels into one global label space",
    long_about = None
)]
struct Cli {
    /// Root directory of the block store
    #[arg(short, long)]
    store_path: PathBuf,
    /// Name of the intensity dataset to segment
    #[arg(short, long)]
    dataset: String,
    /// Base name for the output label datasets
    #[arg(short, long)]
    output: String,
    /// Path to RON configuration file to use
    #[arg(short, long)]
    config_path: Option<PathBuf>,
    /// Foreground cutoff, overriding the configuration
    #[arg(long)]
    threshold: Option<f64>,
    /// Distance-transform floor, overriding the configuration
    #[arg(long)]
    min_value: Option<f64>,
    /// Block extent as x,y,z, overriding the configuration
    #[arg(long, value_delimiter = ',', num_args = 3)]
    block_extent: Option<Vec<u64>>,
    /// Halo extent as x,y,z, overriding the configuration
    #[arg(long, value_delimiter = ',', num_args = 3)]
    halo_extent: Option<Vec<u64>>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config_path {
        Some(path) => JobConfig::from_ron_file(path)?,
        None => JobConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(min_value) = cli.min_value {
        config.min_value = min_value;
    }
    if let Some(extent) = cli.block_extent {
        config.block_extent = into_extent(extent)?;
    }
    if let Some(extent) = cli.halo_extent {
        config.halo_extent = into_extent(extent)?;
    }

    let pool = match config.num_threads {
        Some(num_threads) => TaskPool::new(num_threads),
        None => TaskPool::with_available_parallelism(),
    };
    info!("Running with {} worker threads", pool.num_threads());

    let store = FsBlockStore::new(cli.store_path);
    let segmenter = FloodFillSegmenter::new(config.threshold, config.min_value);
    let pipeline = SegmentationPipeline::new(
        &store,
        segmenter,
        pool,
        cli.dataset,
        cli.output,
        config.block_extent,
        config.halo_extent,
    )?;

    let summary = pipeline.run()?;
    info!(
        "Job finished: {} global labels, {} sets among merged labels",
        summary.total_label_count, summary.merged_set_count
    );
    Ok(())
}

fn into_extent(values: Vec<u64>) -> Result<[u64; 3]> {
    match <[u64; 3]>::try_from(values) {
        Ok(extent) => Ok(extent),
        Err(values) => bail!("Expected 3 comma-separated values, got {}", values.len()),
    }
}
