//! The end-to-end COG run: enumerate → convert → overviews → COG → cleanup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

use crate::backend::RasterBackend;
use crate::batch::{assemble_cogs, convert_batch, BatchReport, COG_DIR};
use crate::cleanup::{matching_files, remove_matching};
use crate::error::{CogError, Result};
use crate::options::CogConfig;
use crate::overviews::build_overviews;

/// Extensions picked up from the input directory.
pub const INPUT_EXTENSIONS: [&str; 3] = ["asc", "dem", "tif"];

/// Per-stage results of a completed run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub inputs: Vec<PathBuf>,
    pub convert: BatchReport,
    pub overviews: BatchReport,
    pub cog: BatchReport,
    pub removed: Vec<PathBuf>,
    pub cog_dir: PathBuf,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn failure_count(&self) -> usize {
        self.convert.failed.len() + self.overviews.failed.len() + self.cog.failed.len()
    }
}

/// Lists the rasters directly inside `dir` whose extension is one of
/// `extensions` (case-insensitive), sorted by path.
pub fn enumerate_inputs(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Drives one run of the COG conversion against a [`RasterBackend`].
pub struct CogPipeline<'a, B: RasterBackend + ?Sized> {
    backend: &'a B,
    config: CogConfig,
}

impl<'a, B: RasterBackend + ?Sized> CogPipeline<'a, B> {
    pub fn new(backend: &'a B, config: CogConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &CogConfig {
        &self.config
    }

    /// Checks the directory pair and prepares the output directory.
    fn select_dirs(&self, input_dir: &Path, output_dir: &Path) -> Result<()> {
        if !input_dir.is_dir() {
            return Err(CogError::invalid_input(
                input_dir,
                "input must be an existing directory",
            ));
        }
        fs::create_dir_all(output_dir)?;

        // cleanup would otherwise delete the source .tif files
        if fs::canonicalize(input_dir)? == fs::canonicalize(output_dir)? {
            return Err(CogError::invalid_input(
                output_dir,
                "output directory must differ from the input directory",
            ));
        }
        Ok(())
    }

    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<PipelineReport> {
        let start_time = Instant::now();

        self.select_dirs(input_dir, output_dir)?;
        self.backend.configure(&self.config)?;

        let inputs = enumerate_inputs(input_dir, &INPUT_EXTENSIONS)?;
        info!("Found {} input rasters in {:?}", inputs.len(), input_dir);

        let convert = convert_batch(self.backend, &inputs, output_dir, &self.config)?;

        // everything now in the output dir, including outputs of earlier runs
        let intermediates = matching_files(output_dir, &self.config.cleanup_pattern)?;
        let overviews = build_overviews(self.backend, &intermediates, output_dir, &self.config)?;

        let cog_inputs: Vec<PathBuf> = overviews.processed.clone();
        let cog = assemble_cogs(self.backend, &cog_inputs, output_dir, &self.config)?;

        let removed = remove_matching(output_dir, &self.config.cleanup_pattern)?;

        let report = PipelineReport {
            inputs,
            convert,
            overviews,
            cog,
            removed,
            cog_dir: output_dir.join(COG_DIR),
            elapsed: start_time.elapsed(),
        };
        info!(
            "COG run finished in {:?}: {} COGs written, {} failures",
            report.elapsed,
            report.cog.processed.len(),
            report.failure_count()
        );
        Ok(report)
    }
}
