use gdal::cpl::CslStringList;
use gdal::raster::GdalDataType;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DatasetOptions, DriverManager, GdalOpenFlags};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CogError, Result};
use crate::options::{CogConfig, Resampling, TranslateOptions};

/// Basic facts about a raster that opened successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub path: PathBuf,
    pub driver: String,
    pub cols: usize,
    pub rows: usize,
    pub bands: usize,
    pub size_bytes: u64,
    /// WKT of the dataset's spatial reference, `None` when undefined.
    pub projection: Option<String>,
}

impl RasterInfo {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1e6
    }
}

/// The raster operations the pipeline and the scanner rely on.
///
/// Every operation may fail with an opaque error; callers decide whether a
/// failure is isolated to one file or ends the run.
pub trait RasterBackend: Send + Sync {
    /// Applies process-wide settings before a batch starts.
    fn configure(&self, _config: &CogConfig) -> Result<()> {
        Ok(())
    }

    /// Opens `path` and reads its metadata. With `verify_pixels` every
    /// scanline of the first band is decoded as well.
    fn inspect(&self, path: &Path, verify_pixels: bool) -> Result<RasterInfo>;

    /// Writes a translated copy of `src` to `dst`.
    fn translate(&self, src: &Path, dst: &Path, options: &TranslateOptions) -> Result<()>;

    /// Builds internal overviews for the raster at `path`.
    fn build_overviews(&self, path: &Path, resampling: Resampling, levels: &[i32]) -> Result<()>;
}

/// [`RasterBackend`] backed by the GDAL library.
#[derive(Debug, Default)]
pub struct GdalBackend {}

impl GdalBackend {
    pub fn new() -> Self {
        Self {}
    }

    /// Whether the GDAL build has the drivers the pipeline writes with.
    pub fn is_available() -> bool {
        ["GTiff", "VRT"]
            .iter()
            .all(|name| DriverManager::get_driver_by_name(name).is_ok())
    }

    fn creation_options(options: &TranslateOptions, is_float: bool) -> Result<CslStringList> {
        let mut list = CslStringList::new();
        for (key, value) in options.creation_options() {
            // the floating point predictor is rejected for integer rasters
            if key == "PREDICTOR" && value == "3" && !is_float {
                tracing::debug!("Integer source, using PREDICTOR=2 instead of 3");
                list.set_name_value(key, "2")?;
                continue;
            }
            list.set_name_value(key, &value)?;
        }
        Ok(list)
    }

    /// Assigns `epsg` to an in-memory VRT view of `src` so the source file
    /// itself is never modified.
    fn with_spatial_ref(src: &Dataset, epsg: u32) -> Result<Dataset> {
        let vrt_driver = DriverManager::get_driver_by_name("VRT")?;
        let mut vrt = src.create_copy(&vrt_driver, "", &CslStringList::new())?;

        let srs = SpatialRef::from_epsg(epsg)?;
        let wkt = srs.to_wkt()?;
        vrt.set_projection(&wkt)?;

        Ok(vrt)
    }
}

impl RasterBackend for GdalBackend {
    fn configure(&self, config: &CogConfig) -> Result<()> {
        for (key, value) in config.gdal_config_options() {
            gdal::config::set_config_option(key, &value)?;
            tracing::debug!("GDAL config {}={}", key, value);
        }
        Ok(())
    }

    fn inspect(&self, path: &Path, verify_pixels: bool) -> Result<RasterInfo> {
        let size_bytes = fs::metadata(path)?.len();
        let dataset = Dataset::open(path)?;
        let (cols, rows) = dataset.raster_size();
        let bands = dataset.raster_count();

        if verify_pixels && bands > 0 {
            // truncated JPEGs usually open fine and only fail on the last scanlines
            let band = dataset.rasterband(1)?;
            for row in 0..rows {
                band.read_as::<f64>((0, row as isize), (cols, 1), (cols, 1), None)?;
            }
        }

        let projection = dataset.projection();
        Ok(RasterInfo {
            path: path.to_path_buf(),
            driver: dataset.driver().short_name(),
            cols,
            rows,
            bands,
            size_bytes,
            projection: (!projection.is_empty()).then_some(projection),
        })
    }

    fn translate(&self, src: &Path, dst: &Path, options: &TranslateOptions) -> Result<()> {
        let driver = DriverManager::get_driver_by_name(options.driver)?;
        let source = Dataset::open(src)?;

        if source.raster_count() == 0 {
            return Err(CogError::Backend(format!(
                "{} has no raster bands",
                src.display()
            )));
        }
        let is_float = matches!(
            source.rasterband(1)?.band_type(),
            GdalDataType::Float32 | GdalDataType::Float64
        );
        let creation = Self::creation_options(options, is_float)?;

        match options.epsg {
            Some(epsg) => {
                let view = Self::with_spatial_ref(&source, epsg)?;
                view.create_copy(&driver, dst, &creation)?;
            }
            None => {
                source.create_copy(&driver, dst, &creation)?;
            }
        }

        Ok(())
    }

    fn build_overviews(&self, path: &Path, resampling: Resampling, levels: &[i32]) -> Result<()> {
        let mut dataset = Dataset::open_ex(
            path,
            DatasetOptions {
                open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
                ..Default::default()
            },
        )?;

        dataset.build_overviews(resampling.as_gdal(), levels, &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::raster::Buffer;
    use tempfile::TempDir;

    fn init_gdal() -> bool {
        // some minimal GDAL builds ship without GTiff
        GdalBackend::is_available()
    }

    fn write_float_tiff(path: &Path, cols: usize, rows: usize) {
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let mut dataset = driver
            .create_with_band_type::<f32, _>(path, cols, rows, 1)
            .unwrap();
        dataset
            .set_geo_transform(&[500000.0, 10.0, 0.0, 5500000.0, 0.0, -10.0])
            .unwrap();

        let values: Vec<f32> = (0..cols * rows).map(|v| v as f32 * 0.5).collect();
        let mut band = dataset.rasterband(1).unwrap();
        let mut buffer = Buffer::new((cols, rows), values);
        band.write((0, 0), (cols, rows), &mut buffer).unwrap();
    }

    #[test]
    fn test_inspect_reports_shape() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff/VRT drivers not available in GDAL");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shape.tif");
        write_float_tiff(&path, 40, 20);

        let info = GdalBackend::new().inspect(&path, true).unwrap();
        assert_eq!((info.cols, info.rows), (40, 20));
        assert_eq!(info.bands, 1);
        assert_eq!(info.driver, "GTiff");
        assert!(info.size_bytes > 0);
        assert!(info.projection.is_none());
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff/VRT drivers not available in GDAL");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"\xff\xd8\xff\xe0 definitely not a jpeg").unwrap();

        assert!(GdalBackend::new().inspect(&path, false).is_err());
    }

    #[test]
    fn test_translate_assigns_epsg() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff/VRT drivers not available in GDAL");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src.tif");
        let dst = temp_dir.path().join("dst.tif");
        write_float_tiff(&src, 64, 64);

        let options = TranslateOptions::intermediate(&CogConfig::default(), Some(3157));
        GdalBackend::new().translate(&src, &dst, &options).unwrap();

        let dataset = Dataset::open(&dst).unwrap();
        assert_eq!(dataset.raster_size(), (64, 64));
        let expected = SpatialRef::from_epsg(3157).unwrap();
        assert!(dataset.spatial_ref().unwrap() == expected);

        // the source keeps its undefined reference
        assert!(Dataset::open(&src).unwrap().projection().is_empty());
    }

    #[test]
    fn test_build_overviews_then_cog_copy() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff/VRT drivers not available in GDAL");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("tiled.tif");
        let cog = temp_dir.path().join("cog.tif");
        write_float_tiff(&src, 128, 128);

        let backend = GdalBackend::new();
        let config = CogConfig {
            block_x: 64,
            block_y: 64,
            ..Default::default()
        };
        backend.configure(&config).unwrap();
        backend
            .build_overviews(&src, config.resampling, &config.overview_levels)
            .unwrap();
        assert_eq!(
            Dataset::open(&src)
                .unwrap()
                .rasterband(1)
                .unwrap()
                .overview_count()
                .unwrap(),
            2
        );

        backend
            .translate(&src, &cog, &TranslateOptions::cog(&config))
            .unwrap();
        let band_overviews = Dataset::open(&cog)
            .unwrap()
            .rasterband(1)
            .unwrap()
            .overview_count()
            .unwrap();
        assert_eq!(band_overviews, 2);
    }
}
