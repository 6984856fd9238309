use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use dem_cog::options::{CogConfig, Compression, Resampling};
use dem_cog::scan::{self, ScanConfig};
use dem_cog::{CogPipeline, GdalBackend};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Show per-stage progress bars
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert USGS DEM / ASCII grid / GeoTIFF rasters into Cloud-Optimized GeoTIFFs
    Cog(CogArgs),
    /// Recursively look for rasters GDAL cannot open and log them to a CSV
    Scan(ScanArgs),
}

#[derive(ClapArgs, Debug)]
struct CogArgs {
    /// Directory holding the .asc / .dem / .tif inputs
    #[arg(value_name = "INPUT_DIR")]
    input: PathBuf,

    /// Output directory (COGs are written to its COG/ subdirectory)
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Compression method: deflate, lzw, zstd, jpeg or none
    #[arg(long, default_value = "deflate")]
    compress: Compression,

    /// Compression level for deflate / zstd
    #[arg(long, default_value_t = 6)]
    level: u8,

    /// TIFF predictor (1 none, 2 horizontal, 3 floating point)
    #[arg(long, default_value_t = 3)]
    predictor: u8,

    /// JPEG quality, used with --compress jpeg
    #[arg(long, default_value_t = 75)]
    jpeg_quality: u8,

    /// Overview reduction factors
    #[arg(long, value_delimiter = ',', default_value = "2,4")]
    overviews: Vec<i32>,

    /// Overview resampling kernel
    #[arg(long, default_value = "cubic")]
    resampling: Resampling,

    /// Internal tile size of the COG outputs (power of two, 64 to 4096)
    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// GDAL compression threads per file (default: all CPUs)
    #[arg(short, long)]
    threads: Option<usize>,
}

#[derive(ClapArgs, Debug)]
struct ScanArgs {
    /// Root directory to scan recursively
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,

    /// File extension to check
    #[arg(long, default_value = "jpg")]
    ext: String,

    /// CSV that unreadable files are appended to
    #[arg(long, value_name = "FILE", default_value = scan::DEFAULT_ERROR_CSV)]
    errors: PathBuf,

    /// Decode all pixels instead of only opening each file
    #[arg(long)]
    verify_pixels: bool,

    /// Parallel scan threads (default: number of CPU cores)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    // logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Cog(cog_args) => run_cog(cog_args, args.progress),
        Command::Scan(scan_args) => run_scan(scan_args, args.progress),
    }
}

fn run_cog(args: CogArgs, progress: bool) -> Result<()> {
    let config = CogConfig {
        predictor: args.predictor,
        compression: args.compress,
        level: args.level,
        jpeg_quality: args.jpeg_quality,
        overview_levels: args.overviews,
        resampling: args.resampling,
        block_x: args.block_size,
        block_y: args.block_size,
        num_threads: args.threads,
        show_progress: progress,
        ..Default::default()
    };

    let backend = GdalBackend::new();
    if !GdalBackend::is_available() {
        anyhow::bail!("GDAL was built without the GTiff or VRT driver");
    }

    let pipeline = CogPipeline::new(&backend, config).context("Invalid COG settings")?;
    info!("Converting {:?} -> {:?}", args.input, args.output);
    let report = pipeline
        .run(&args.input, &args.output)
        .with_context(|| format!("COG conversion of {:?} failed", args.input))?;

    info!(
        "{} inputs, {} converted, {} already present, {} COGs in {:?}",
        report.inputs.len(),
        report.convert.processed.len(),
        report.convert.skipped.len(),
        report.cog.processed.len(),
        report.cog_dir
    );

    if report.failure_count() > 0 {
        warn!("{} files failed; see the error logs:", report.failure_count());
        for failure in report
            .convert
            .failed
            .iter()
            .chain(&report.overviews.failed)
            .chain(&report.cog.failed)
        {
            error!("  {}: {}", failure.path.display(), failure.message);
        }
    }

    // elapsed time for the whole run
    info!("Total processing time: {:?}", report.elapsed);
    Ok(())
}

fn run_scan(args: ScanArgs, progress: bool) -> Result<()> {
    // size the global pool used by the parallel scan
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let config = ScanConfig {
        extension: args.ext.trim_start_matches('.').to_string(),
        verify_pixels: args.verify_pixels,
        error_csv: args.errors,
        show_progress: progress,
    };

    let backend = GdalBackend::new();
    let report = scan::scan(&backend, &args.root, &config)
        .with_context(|| format!("Scan of {:?} failed", args.root))?;

    println!("--- {:.3} seconds ---", report.elapsed.as_secs_f64());
    println!("{} files", report.total());
    if !report.failed.is_empty() {
        println!(
            "{} unreadable, logged to {}",
            report.failed.len(),
            config.error_csv.display()
        );
    }

    Ok(())
}
