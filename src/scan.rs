//! Recursive scan for rasters GDAL cannot read.
//!
//! Every file under the root with the configured extension is opened
//! through the backend. Readable files are reported with their size and
//! dimensions; unreadable ones are appended to a CSV error log as
//! `path,message` rows.

use csv::WriterBuilder;
use rayon::prelude::*;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::backend::{RasterBackend, RasterInfo};
use crate::batch::{progress_bar, single_line, FileFailure};
use crate::error::{CogError, Result};

pub const DEFAULT_ERROR_CSV: &str = "image_errors.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Extension to look for, without the dot. Compared case-insensitively.
    pub extension: String,
    /// Decode every scanline instead of only opening the file.
    pub verify_pixels: bool,
    pub error_csv: PathBuf,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "jpg".to_string(),
            verify_pixels: false,
            error_csv: PathBuf::from(DEFAULT_ERROR_CSV),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub readable: Vec<RasterInfo>,
    pub failed: Vec<FileFailure>,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.readable.len() + self.failed.len()
    }
}

/// Collects files under `root` whose extension equals `extension`.
pub fn collect_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CogError::invalid_input(root, "scan root must be a directory"));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Appends one `path,message` record per failure to the CSV at `path`.
fn append_csv_rows(path: &Path, failures: &[FileFailure]) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    for failure in failures {
        let path = failure.path.to_string_lossy();
        let message = single_line(&failure.message);
        writer.write_record([&*path, message.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Scans `root` and writes unreadable files to `config.error_csv`.
pub fn scan<B: RasterBackend + ?Sized>(
    backend: &B,
    root: &Path,
    config: &ScanConfig,
) -> Result<ScanReport> {
    let start_time = Instant::now();

    let files = collect_files(root, &config.extension)?;
    info!("Found {} .{} files under {:?}", files.len(), config.extension, root);

    let pb = progress_bar(files.len(), config.show_progress, "scan");
    let results: Vec<(&PathBuf, Result<RasterInfo>)> = files
        .par_iter()
        .map(|path| {
            let result = backend.inspect(path, config.verify_pixels);
            pb.inc(1);
            (path, result)
        })
        .collect();
    pb.finish_and_clear();

    let mut report = ScanReport::default();
    for (path, result) in results {
        match result {
            Ok(info) => {
                info!("{} -- {:.3} Mb", path.display(), info.size_mb());
                info!(
                    "     bands {} -- {} cols x {} rows",
                    info.bands, info.cols, info.rows
                );
                report.readable.push(info);
            }
            Err(e) => {
                error!("Unable to open {}: {}", path.display(), e);
                report.failed.push(FileFailure {
                    path: path.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    append_csv_rows(&config.error_csv, &report.failed)?;

    report.elapsed = start_time.elapsed();
    info!(
        "Scanned {} files in {:?}, {} unreadable",
        report.total(),
        report.elapsed,
        report.failed.len()
    );
    Ok(report)
}
