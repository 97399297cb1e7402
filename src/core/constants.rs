//! Engine-wide defaults for grids, resolutions and projections.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Screen resolution assumed when converting between scales and resolutions.
pub const DOTS_PER_INCH: f64 = 72.0;

/// Number of zoom levels generated when a ladder is derived from a range.
pub const DEFAULT_NUM_ZOOM_LEVELS: usize = 16;

/// Default projection code for new maps.
pub const DEFAULT_PROJECTION: &str = "EPSG:3857";

/// Half the world width of spherical mercator, in metres.
pub const MERCATOR_POLE: f64 = 20_037_508.34;

/// Fraction of the viewport a pan animation may cover before it jumps instead.
pub const DEFAULT_PAN_RATIO: f64 = 1.5;

/// Duration of an animated `pan_to`.
pub const DEFAULT_PAN_DURATION_MS: u64 = 400;

/// Decimal places kept when writing a BBOX parameter.
pub const BBOX_PRECISION: u32 = 6;
