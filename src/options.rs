//! Run configuration and the GDAL creation options derived from it.

use glob::Pattern;
use std::fmt;
use std::str::FromStr;

use crate::error::{CogError, Result};

/// Tile size bounds accepted for intermediates, COGs and their overviews.
pub const MIN_BLOCK_SIZE: usize = 64;
pub const MAX_BLOCK_SIZE: usize = 4096;

/// TIFF compression methods the pipeline knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Deflate,
    Lzw,
    Zstd,
    Jpeg,
    None,
}

impl Compression {
    /// Value for the GTiff `COMPRESS` creation option.
    pub fn as_gdal(&self) -> &'static str {
        match self {
            Compression::Deflate => "DEFLATE",
            Compression::Lzw => "LZW",
            Compression::Zstd => "ZSTD",
            Compression::Jpeg => "JPEG",
            Compression::None => "NONE",
        }
    }

    /// Creation option carrying the compression level, if the codec has one.
    pub fn level_key(&self) -> Option<&'static str> {
        match self {
            Compression::Deflate => Some("ZLEVEL"),
            Compression::Zstd => Some("ZSTD_LEVEL"),
            _ => None,
        }
    }

    /// Whether a horizontal/floating point predictor applies.
    pub fn supports_predictor(&self) -> bool {
        matches!(
            self,
            Compression::Deflate | Compression::Lzw | Compression::Zstd
        )
    }

    fn level_range(&self) -> Option<(u8, u8)> {
        match self {
            Compression::Deflate => Some((1, 9)),
            Compression::Zstd => Some((1, 22)),
            _ => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gdal())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFLATE" => Ok(Compression::Deflate),
            "LZW" => Ok(Compression::Lzw),
            "ZSTD" => Ok(Compression::Zstd),
            "JPEG" => Ok(Compression::Jpeg),
            "NONE" => Ok(Compression::None),
            other => Err(format!(
                "unknown compression '{other}' (expected deflate, lzw, zstd, jpeg or none)"
            )),
        }
    }
}

/// Resampling kernels accepted by GDAL's overview builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    Nearest,
    Average,
    Bilinear,
    #[default]
    Cubic,
    CubicSpline,
    Lanczos,
    Mode,
    Gauss,
}

impl Resampling {
    pub fn as_gdal(&self) -> &'static str {
        match self {
            Resampling::Nearest => "NEAREST",
            Resampling::Average => "AVERAGE",
            Resampling::Bilinear => "BILINEAR",
            Resampling::Cubic => "CUBIC",
            Resampling::CubicSpline => "CUBICSPLINE",
            Resampling::Lanczos => "LANCZOS",
            Resampling::Mode => "MODE",
            Resampling::Gauss => "GAUSS",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gdal())
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "average" => Ok(Resampling::Average),
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" => Ok(Resampling::Cubic),
            "cubicspline" => Ok(Resampling::CubicSpline),
            "lanczos" => Ok(Resampling::Lanczos),
            "mode" => Ok(Resampling::Mode),
            "gauss" => Ok(Resampling::Gauss),
            other => Err(format!("unknown resampling kernel '{other}'")),
        }
    }
}

/// Settings for one pipeline run. Built once and passed by reference to
/// every stage; nothing mutates it mid-batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CogConfig {
    pub predictor: u8,
    pub compression: Compression,
    /// ZLEVEL / ZSTD_LEVEL, ignored by codecs without a level.
    pub level: u8,
    /// Only used when `compression` is JPEG.
    pub jpeg_quality: u8,
    pub overview_levels: Vec<i32>,
    pub resampling: Resampling,
    pub block_x: usize,
    pub block_y: usize,
    /// `None` lets GDAL use every core (`ALL_CPUS`).
    pub num_threads: Option<usize>,
    /// Intermediate files removed once the COGs are written.
    pub cleanup_pattern: String,
    pub show_progress: bool,
}

impl Default for CogConfig {
    fn default() -> Self {
        Self {
            predictor: 3,
            compression: Compression::Deflate,
            level: 6,
            jpeg_quality: 75,
            overview_levels: vec![2, 4],
            resampling: Resampling::Cubic,
            block_x: 512,
            block_y: 512,
            num_threads: None,
            cleanup_pattern: "*.tif".to_string(),
            show_progress: false,
        }
    }
}

impl CogConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.predictor) {
            return Err(CogError::InvalidConfig(format!(
                "predictor must be 1, 2 or 3, got {}",
                self.predictor
            )));
        }
        if let Some((lo, hi)) = self.compression.level_range() {
            if !(lo..=hi).contains(&self.level) {
                return Err(CogError::InvalidConfig(format!(
                    "{} level must be in {}..={}, got {}",
                    self.compression, lo, hi, self.level
                )));
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CogError::InvalidConfig(format!(
                "JPEG quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.overview_levels.is_empty() || self.overview_levels.iter().any(|&l| l < 2) {
            return Err(CogError::InvalidConfig(format!(
                "overview levels must be non-empty factors >= 2, got {:?}",
                self.overview_levels
            )));
        }
        // also used as GDAL_TIFF_OVR_BLOCKSIZE, which only takes powers of two
        for size in [self.block_x, self.block_y] {
            if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) || !size.is_power_of_two() {
                return Err(CogError::InvalidConfig(format!(
                    "block size must be a power of two in {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}, got {size}"
                )));
            }
        }
        if let Err(e) = Pattern::new(&self.cleanup_pattern) {
            return Err(CogError::InvalidConfig(format!(
                "cleanup pattern '{}' is invalid: {}",
                self.cleanup_pattern, e
            )));
        }
        if self.num_threads == Some(0) {
            return Err(CogError::InvalidConfig("thread count must be >= 1".into()));
        }
        Ok(())
    }

    /// Process-wide GDAL configuration options matching this config.
    pub fn gdal_config_options(&self) -> Vec<(&'static str, String)> {
        let mut options = vec![
            ("GDAL_TIFF_OVR_BLOCKSIZE", self.block_x.to_string()),
            ("COMPRESS_OVERVIEW", self.compression.as_gdal().to_string()),
        ];
        if self.compression == Compression::Jpeg {
            options.push(("JPEG_QUALITY_OVERVIEW", self.jpeg_quality.to_string()));
        }
        options
    }
}

/// Structured equivalent of a `gdal_translate` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    pub driver: &'static str,
    /// Spatial reference override (`-a_srs EPSG:<code>`).
    pub epsg: Option<u32>,
    pub predictor: Option<u8>,
    pub tiled: bool,
    pub block_size: Option<(usize, usize)>,
    pub num_threads: Option<usize>,
    pub compression: Compression,
    pub level: Option<u8>,
    pub jpeg_quality: Option<u8>,
    pub copy_src_overviews: bool,
}

impl TranslateOptions {
    /// Options for the compress-and-tile stage.
    pub fn intermediate(config: &CogConfig, epsg: Option<u32>) -> Self {
        let compression = config.compression;
        Self {
            driver: "GTiff",
            epsg,
            predictor: compression
                .supports_predictor()
                .then_some(config.predictor),
            tiled: true,
            block_size: None,
            num_threads: config.num_threads,
            compression,
            level: compression.level_key().map(|_| config.level),
            jpeg_quality: (compression == Compression::Jpeg).then_some(config.jpeg_quality),
            copy_src_overviews: false,
        }
    }

    /// Options for the final COG stage: explicit tiling and overview copy.
    pub fn cog(config: &CogConfig) -> Self {
        let compression = config.compression;
        Self {
            driver: "GTiff",
            epsg: None,
            predictor: None,
            tiled: true,
            block_size: Some((config.block_x, config.block_y)),
            num_threads: config.num_threads,
            compression,
            level: None,
            jpeg_quality: (compression == Compression::Jpeg).then_some(config.jpeg_quality),
            copy_src_overviews: true,
        }
    }

    /// Driver creation options in the order GDAL receives them.
    pub fn creation_options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();

        if self.tiled {
            options.push(("TILED", "YES".to_string()));
        }
        if let Some((x, y)) = self.block_size {
            options.push(("BLOCKXSIZE", x.to_string()));
            options.push(("BLOCKYSIZE", y.to_string()));
        }
        if self.copy_src_overviews {
            options.push(("COPY_SRC_OVERVIEWS", "YES".to_string()));
        }
        options.push(("COMPRESS", self.compression.as_gdal().to_string()));
        if let Some(predictor) = self.predictor {
            options.push(("PREDICTOR", predictor.to_string()));
        }
        if let (Some(key), Some(level)) = (self.compression.level_key(), self.level) {
            options.push((key, level.to_string()));
        }
        if let Some(quality) = self.jpeg_quality {
            options.push(("JPEG_QUALITY", quality.to_string()));
        }
        let threads = self
            .num_threads
            .map(|n| n.to_string())
            .unwrap_or_else(|| "ALL_CPUS".to_string());
        options.push(("NUM_THREADS", threads));

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(options: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CogConfig::default();
        config.validate().unwrap();
        assert_eq!(config.predictor, 3);
        assert_eq!(config.compression, Compression::Deflate);
        assert_eq!(config.level, 6);
        assert_eq!(config.overview_levels, vec![2, 4]);
        assert_eq!(config.resampling, Resampling::Cubic);
        assert_eq!((config.block_x, config.block_y), (512, 512));
    }

    #[test]
    fn test_intermediate_options() {
        let config = CogConfig::default();
        let opts = TranslateOptions::intermediate(&config, Some(3157));
        assert_eq!(opts.driver, "GTiff");
        assert_eq!(opts.epsg, Some(3157));

        let co = opts.creation_options();
        assert_eq!(value(&co, "TILED"), Some("YES"));
        assert_eq!(value(&co, "COMPRESS"), Some("DEFLATE"));
        assert_eq!(value(&co, "PREDICTOR"), Some("3"));
        assert_eq!(value(&co, "ZLEVEL"), Some("6"));
        assert_eq!(value(&co, "NUM_THREADS"), Some("ALL_CPUS"));
        assert_eq!(value(&co, "COPY_SRC_OVERVIEWS"), None);
        assert_eq!(value(&co, "JPEG_QUALITY"), None);
    }

    #[test]
    fn test_jpeg_appends_quality() {
        let config = CogConfig {
            compression: Compression::Jpeg,
            jpeg_quality: 80,
            ..Default::default()
        };
        let co = TranslateOptions::intermediate(&config, None).creation_options();
        assert_eq!(value(&co, "COMPRESS"), Some("JPEG"));
        assert_eq!(value(&co, "JPEG_QUALITY"), Some("80"));
        assert_eq!(value(&co, "ZLEVEL"), None);
        assert_eq!(value(&co, "PREDICTOR"), None);

        let co = TranslateOptions::cog(&config).creation_options();
        assert_eq!(value(&co, "JPEG_QUALITY"), Some("80"));
    }

    #[test]
    fn test_cog_options() {
        let config = CogConfig {
            num_threads: Some(4),
            ..Default::default()
        };
        let opts = TranslateOptions::cog(&config);
        assert_eq!(opts.epsg, None);

        let co = opts.creation_options();
        assert_eq!(value(&co, "TILED"), Some("YES"));
        assert_eq!(value(&co, "COPY_SRC_OVERVIEWS"), Some("YES"));
        assert_eq!(value(&co, "BLOCKXSIZE"), Some("512"));
        assert_eq!(value(&co, "BLOCKYSIZE"), Some("512"));
        assert_eq!(value(&co, "COMPRESS"), Some("DEFLATE"));
        assert_eq!(value(&co, "NUM_THREADS"), Some("4"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            CogConfig {
                predictor: 4,
                ..Default::default()
            },
            CogConfig {
                level: 12,
                ..Default::default()
            },
            CogConfig {
                jpeg_quality: 0,
                ..Default::default()
            },
            CogConfig {
                overview_levels: vec![],
                ..Default::default()
            },
            CogConfig {
                overview_levels: vec![1, 2],
                ..Default::default()
            },
            CogConfig {
                block_x: 500,
                ..Default::default()
            },
            // multiples of 16 that GDAL_TIFF_OVR_BLOCKSIZE still rejects
            CogConfig {
                block_x: 48,
                block_y: 48,
                ..Default::default()
            },
            CogConfig {
                block_y: 400,
                ..Default::default()
            },
            CogConfig {
                block_x: 8192,
                block_y: 8192,
                ..Default::default()
            },
            CogConfig {
                cleanup_pattern: "[*.tif".to_string(),
                ..Default::default()
            },
            CogConfig {
                num_threads: Some(0),
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(CogError::InvalidConfig(_))),
                "expected rejection for {:?}",
                config
            );
        }

        // level is only checked for codecs that have one
        let lzw = CogConfig {
            compression: Compression::Lzw,
            level: 42,
            ..Default::default()
        };
        lzw.validate().unwrap();

        for size in [MIN_BLOCK_SIZE, 256, MAX_BLOCK_SIZE] {
            let config = CogConfig {
                block_x: size,
                block_y: size,
                ..Default::default()
            };
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("deflate".parse::<Compression>(), Ok(Compression::Deflate));
        assert_eq!("JPEG".parse::<Compression>(), Ok(Compression::Jpeg));
        assert!("brotli".parse::<Compression>().is_err());
        assert_eq!("Cubic".parse::<Resampling>(), Ok(Resampling::Cubic));
        assert_eq!(Resampling::Lanczos.to_string(), "LANCZOS");
    }

    #[test]
    fn test_gdal_config_options() {
        let config = CogConfig {
            compression: Compression::Jpeg,
            block_x: 256,
            ..Default::default()
        };
        let opts = config.gdal_config_options();
        assert_eq!(value(&opts, "GDAL_TIFF_OVR_BLOCKSIZE"), Some("256"));
        assert_eq!(value(&opts, "COMPRESS_OVERVIEW"), Some("JPEG"));
        assert_eq!(value(&opts, "JPEG_QUALITY_OVERVIEW"), Some("75"));
    }
}
