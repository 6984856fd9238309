//! Per-file batch stages: compress-and-tile and COG assembly.
//!
//! Both stages share the same policy: an output that already exists is
//! skipped without touching the backend, and a file the backend rejects is
//! recorded in the stage's error log while the batch moves on.

use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::backend::RasterBackend;
use crate::error::Result;
use crate::options::{CogConfig, TranslateOptions};
use crate::projection::epsg_from_filename;

pub const CONVERT_ERROR_LOG: &str = "compression_and_tiling_errors.txt";
pub const COG_DIR: &str = "COG";
pub const COG_ERROR_LOG: &str = "COG_creation_errors.txt";

/// One input raster and the `.tif` it converts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ConversionJob {
    /// Output keeps the input's stem with a `.tif` extension, inside `out_dir`.
    pub fn new(input: impl Into<PathBuf>, out_dir: &Path) -> Self {
        let input = input.into();
        let mut name: OsString = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".tif");

        Self {
            output: out_dir.join(name),
            input,
        }
    }
}

/// A file a stage could not process, with the backend's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one batch stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Paths written (or updated in place) by the stage.
    pub processed: Vec<PathBuf>,
    /// Outputs that already existed.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FileFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_paths(&self) -> impl Iterator<Item = &Path> {
        self.failed.iter().map(|f| f.path.as_path())
    }
}

/// Append-only `path<TAB>message` log.
///
/// The file is opened for each entry and closed again, so nothing is created
/// until the first failure.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, source: &Path, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}\t{}", source.display(), single_line(message))?;
        Ok(())
    }
}

/// Collapses a multi-line backend message so one failure stays one line.
pub(crate) fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn progress_bar(len: usize, visible: bool, stage: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_message(stage.to_string());
    pb
}

/// Runs `backend.translate` for every job whose output is missing.
fn translate_jobs<B, F>(
    backend: &B,
    jobs: &[ConversionJob],
    log: &ErrorLog,
    config: &CogConfig,
    stage: &str,
    options_for: F,
) -> Result<BatchReport>
where
    B: RasterBackend + ?Sized,
    F: Fn(&ConversionJob) -> TranslateOptions,
{
    let mut report = BatchReport::default();
    let pb = progress_bar(jobs.len(), config.show_progress, stage);

    for job in jobs {
        pb.inc(1);

        if job.output.exists() {
            debug!("{}: output exists, skipping {:?}", stage, job.output);
            report.skipped.push(job.output.clone());
            continue;
        }

        let options = options_for(job);
        match backend.translate(&job.input, &job.output, &options) {
            Ok(()) => {
                debug!("{}: wrote {:?}", stage, job.output);
                report.processed.push(job.output.clone());
            }
            Err(e) => {
                let message = e.to_string();
                error!("{}: failed on {:?}: {}", stage, job.input, message);

                // a partial file would be mistaken for a finished one on the next run
                if job.output.exists() {
                    if let Err(rm) = fs::remove_file(&job.output) {
                        warn!("Could not remove partial output {:?}: {}", job.output, rm);
                    }
                }

                log.append(&job.input, &message)?;
                report.failed.push(FileFailure {
                    path: job.input.clone(),
                    message,
                });
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "{}: {} written, {} skipped, {} failed",
        stage,
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Compresses and internally tiles `inputs` into `out_dir`.
///
/// The spatial reference of each output is taken from the input's filename
/// (see [`crate::projection`]). Failures go to
/// `out_dir/compression_and_tiling_errors.txt`.
pub fn convert_batch<B: RasterBackend + ?Sized>(
    backend: &B,
    inputs: &[PathBuf],
    out_dir: &Path,
    config: &CogConfig,
) -> Result<BatchReport> {
    let jobs: Vec<ConversionJob> = inputs
        .iter()
        .map(|input| ConversionJob::new(input, out_dir))
        .collect();
    let log = ErrorLog::new(out_dir.join(CONVERT_ERROR_LOG));

    translate_jobs(backend, &jobs, &log, config, "convert", |job| {
        let epsg = epsg_from_filename(&job.input);
        if epsg.is_none() {
            warn!(
                "No projection token in {:?}, output will have no spatial reference override",
                job.input
            );
        }
        TranslateOptions::intermediate(config, epsg)
    })
}

/// Re-translates `inputs` into `out_dir/COG`, copying their overviews so
/// every output is a self-contained COG. Failures go to
/// `out_dir/COG/COG_creation_errors.txt`.
pub fn assemble_cogs<B: RasterBackend + ?Sized>(
    backend: &B,
    inputs: &[PathBuf],
    out_dir: &Path,
    config: &CogConfig,
) -> Result<BatchReport> {
    let cog_dir = out_dir.join(COG_DIR);
    fs::create_dir_all(&cog_dir)?;

    let jobs: Vec<ConversionJob> = inputs
        .iter()
        .map(|input| ConversionJob::new(input, &cog_dir))
        .collect();
    let log = ErrorLog::new(cog_dir.join(COG_ERROR_LOG));
    let options = TranslateOptions::cog(config);

    translate_jobs(backend, &jobs, &log, config, "cog", |_| options.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_job_output_name() {
        let out = Path::new("/out");
        let job = ConversionJob::new("/in/092g025_utm10.dem", out);
        assert_eq!(job.output, PathBuf::from("/out/092g025_utm10.tif"));

        let job = ConversionJob::new("/in/tile.v2.asc", out);
        assert_eq!(job.output, PathBuf::from("/out/tile.v2.tif"));

        let job = ConversionJob::new("/in/already.tif", out);
        assert_eq!(job.output, PathBuf::from("/out/already.tif"));
    }

    #[test]
    fn test_error_log_created_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let log = ErrorLog::new(temp_dir.path().join("errors.txt"));
        assert!(!log.path().exists());

        log.append(Path::new("/in/a.dem"), "first\nsecond line").unwrap();
        log.append(Path::new("/in/b.dem"), "boom").unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "/in/a.dem\tfirst second line\n/in/b.dem\tboom\n");
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("  a\n\n b \r\nc"), "a b c");
        assert_eq!(single_line(""), "");
    }
}
