pub mod backend;
pub mod batch;
pub mod cleanup;
pub mod error;
pub mod options;
pub mod overviews;
pub mod pipeline;
pub mod projection;
pub mod scan;

pub use backend::{GdalBackend, RasterBackend, RasterInfo};
pub use batch::{BatchReport, ConversionJob, ErrorLog, FileFailure};
pub use error::{CogError, Result};
pub use options::{CogConfig, Compression, Resampling, TranslateOptions};
pub use pipeline::{CogPipeline, PipelineReport};
pub use scan::{ScanConfig, ScanReport};
