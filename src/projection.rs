//! EPSG lookup from GeoBC-style filenames.
//!
//! GeoBC elevation products carry their projection as one underscore
//! delimited token of the filename, e.g. `092g025_utm10_2019.dem` or
//! `bc_092g_bcalb.asc`.

use std::path::Path;

/// Recognised filename tokens and the EPSG code each one maps to.
pub const PROJECTIONS: [(&str, u32); 7] = [
    ("utm08", 3155),
    ("utm8", 3155),
    ("utm09", 3156),
    ("utm9", 3156),
    ("utm10", 3157),
    ("utm11", 2955),
    ("bcalb", 3005),
];

/// Looks up a single token in [`PROJECTIONS`].
pub fn epsg_for_token(token: &str) -> Option<u32> {
    PROJECTIONS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|&(_, epsg)| epsg)
}

/// Resolves the EPSG code encoded in `path`'s file stem.
///
/// The stem is split on `_` and the first token found in [`PROJECTIONS`]
/// wins. Returns `None` when no token matches; callers then convert the
/// raster without a spatial reference override.
pub fn epsg_from_filename(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.split('_').find_map(epsg_for_token)
}
