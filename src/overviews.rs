//! Overview (pyramid) construction for converted rasters.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::backend::RasterBackend;
use crate::batch::{progress_bar, BatchReport, ErrorLog, FileFailure};
use crate::error::Result;
use crate::options::CogConfig;

pub const OVERVIEW_ERROR_LOG: &str = "overview_errors.txt";

/// Builds overviews for each raster in `files` at the configured factors.
///
/// A failure is logged to `out_dir/overview_errors.txt` and recorded in the
/// report; the remaining files are still processed. Rasters listed in
/// `failed` should not be passed on to COG assembly.
pub fn build_overviews<B: RasterBackend + ?Sized>(
    backend: &B,
    files: &[PathBuf],
    out_dir: &Path,
    config: &CogConfig,
) -> Result<BatchReport> {
    let log = ErrorLog::new(out_dir.join(OVERVIEW_ERROR_LOG));
    let mut report = BatchReport::default();
    let pb = progress_bar(files.len(), config.show_progress, "overviews");

    for file in files {
        pb.inc(1);
        match backend.build_overviews(file, config.resampling, &config.overview_levels) {
            Ok(()) => {
                debug!(
                    "Built {:?} overviews ({}) for {:?}",
                    config.overview_levels, config.resampling, file
                );
                report.processed.push(file.clone());
            }
            Err(e) => {
                let message = e.to_string();
                error!("overviews: failed on {:?}: {}", file, message);
                log.append(file, &message)?;
                report.failed.push(FileFailure {
                    path: file.clone(),
                    message,
                });
            }
        }
    }

    pb.finish_and_clear();
    info!(
        "overviews: {} built, {} failed",
        report.processed.len(),
        report.failed.len()
    );
    Ok(report)
}
