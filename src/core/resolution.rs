//! Zoom level to resolution mapping
//!
//! A [`ResolutionLadder`] holds one resolution (map units per pixel) per
//! discrete zoom level, coarsest first.

use crate::core::bounds::Bounds;
use crate::core::constants::DOTS_PER_INCH;
use crate::core::geo::Size;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};

/// Map units, used to convert between scale denominators and resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[serde(alias = "dd")]
    Degrees,
    #[serde(alias = "metres", alias = "meters")]
    M,
    Km,
    Ft,
    Mi,
    Yd,
    Inches,
}

impl Units {
    pub fn inches_per_unit(self) -> f64 {
        match self {
            Units::Inches => 1.0,
            Units::Ft => 12.0,
            Units::Mi => 63_360.0,
            Units::M => 39.37,
            Units::Km => 39_370.0,
            Units::Degrees => 4_374_754.0,
            Units::Yd => 36.0,
        }
    }

    /// Resolution in these units for a scale denominator (or its inverse)
    pub fn resolution_from_scale(self, scale: f64) -> f64 {
        1.0 / (normalize_scale(scale) * self.inches_per_unit() * DOTS_PER_INCH)
    }

    /// Scale denominator shown at `resolution`
    pub fn scale_from_resolution(self, resolution: f64) -> f64 {
        resolution * self.inches_per_unit() * DOTS_PER_INCH
    }
}

/// Accepts both `1:50000` style denominators and their inverse
pub fn normalize_scale(scale: f64) -> f64 {
    if scale > 1.0 {
        1.0 / scale
    } else {
        scale
    }
}

/// Ordered resolutions, strictly the coarsest at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ResolutionLadder {
    resolutions: Vec<f64>,
}

impl ResolutionLadder {
    /// Builds a ladder from explicit resolutions, sorting them descending
    pub fn new(mut resolutions: Vec<f64>) -> Result<Self> {
        if resolutions.is_empty() {
            return Err(MapError::InvalidConfig(
                "resolution ladder needs at least one entry".to_string(),
            ));
        }
        if let Some(bad) = resolutions.iter().find(|r| !r.is_finite() || **r <= 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "resolution {} is not a positive number",
                bad
            )));
        }
        resolutions.sort_by(|a, b| b.total_cmp(a));
        resolutions.dedup();
        Ok(Self { resolutions })
    }

    /// Builds a ladder from scale denominators
    pub fn from_scales(scales: &[f64], units: Units) -> Result<Self> {
        if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(MapError::InvalidConfig(
                "scales must be positive numbers".to_string(),
            ));
        }
        Self::new(
            scales
                .iter()
                .map(|s| units.resolution_from_scale(*s))
                .collect(),
        )
    }

    /// Builds a geometric ladder of `num_levels` entries
    ///
    /// With both bounds the ratio between levels is
    /// `(max / min)^(1 / (num_levels - 1))`; with only one bound each level
    /// halves the previous one.
    pub fn from_range(
        max_resolution: Option<f64>,
        min_resolution: Option<f64>,
        num_levels: usize,
    ) -> Result<Self> {
        if num_levels == 0 {
            return Err(MapError::InvalidConfig(
                "number of zoom levels must be at least 1".to_string(),
            ));
        }
        let base = match (max_resolution, min_resolution) {
            (Some(max), Some(min)) if num_levels > 1 => {
                (max / min).powf(1.0 / (num_levels as f64 - 1.0))
            }
            _ => 2.0,
        };
        let resolutions = match (max_resolution, min_resolution) {
            (Some(max), _) => (0..num_levels)
                .map(|i| max / base.powi(i as i32))
                .collect(),
            (None, Some(min)) => (0..num_levels)
                .rev()
                .map(|i| min * base.powi(i as i32))
                .collect(),
            (None, None) => {
                return Err(MapError::InvalidConfig(
                    "a resolution range needs a max or min resolution".to_string(),
                ))
            }
        };
        Self::new(resolutions)
    }

    /// Fits the coarsest level so `extent` fills a viewport of `size`, halving after that
    pub fn auto_fit(extent: &Bounds, size: Size, num_levels: usize) -> Result<Self> {
        if !size.is_positive() {
            return Err(MapError::InvalidConfig(
                "cannot fit resolutions to an empty viewport".to_string(),
            ));
        }
        let max = (extent.width() / size.width).max(extent.height() / size.height);
        Self::from_range(Some(max), None, num_levels)
    }

    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.resolutions.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.resolutions
    }

    pub fn coarsest(&self) -> f64 {
        self.resolutions[0]
    }

    pub fn finest(&self) -> f64 {
        self.resolutions[self.resolutions.len() - 1]
    }

    pub fn max_zoom(&self) -> usize {
        self.resolutions.len() - 1
    }

    /// Index of an exact resolution match
    pub fn index_of(&self, resolution: f64) -> Option<usize> {
        self.resolutions.iter().position(|r| *r == resolution)
    }

    /// Resolution at `zoom`, or `None` when the zoom is outside the ladder
    ///
    /// In fractional mode the resolution is interpolated linearly between the
    /// neighbouring levels; otherwise the zoom is rounded to a level.
    pub fn resolution_for_zoom(&self, zoom: f64, fractional: bool) -> Option<f64> {
        if !zoom.is_finite() || zoom < 0.0 || zoom > self.max_zoom() as f64 {
            return None;
        }
        if fractional {
            let low = zoom.floor() as usize;
            let high = zoom.ceil() as usize;
            let low_res = self.resolutions[low];
            let high_res = self.resolutions[high];
            Some(low_res - (zoom - low as f64) * (low_res - high_res))
        } else {
            self.get(zoom.round() as usize)
        }
    }

    /// Zoom level for `resolution`
    ///
    /// By default this is the finest level that is still at least as coarse
    /// as `resolution`. With `closest` the level with the smallest absolute
    /// difference wins. In fractional mode the zoom is interpolated between
    /// the two surrounding levels.
    pub fn zoom_for_resolution(&self, resolution: f64, closest: bool, fractional: bool) -> Option<f64> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return None;
        }
        if fractional {
            let mut low_zoom = 0;
            let mut high_res = self.coarsest();
            let mut low_res = self.finest();
            for (i, res) in self.resolutions.iter().copied().enumerate() {
                if res >= resolution {
                    high_res = res;
                    low_zoom = i;
                }
                if res <= resolution {
                    low_res = res;
                    break;
                }
            }
            let d_res = high_res - low_res;
            return if d_res > 0.0 {
                Some(low_zoom as f64 + (high_res - resolution) / d_res)
            } else {
                Some(low_zoom as f64)
            };
        }

        let mut min_diff = f64::INFINITY;
        let mut index = self.resolutions.len();
        for (i, res) in self.resolutions.iter().copied().enumerate() {
            if closest {
                let diff = (res - resolution).abs();
                if diff > min_diff {
                    index = i;
                    break;
                }
                min_diff = diff;
            } else if res < resolution {
                index = i;
                break;
            }
        }
        Some(index.saturating_sub(1) as f64)
    }

    /// Closest entry to `resolution`, scanning from the finest level
    ///
    /// Exact matches are returned unchanged.
    pub fn closest(&self, resolution: f64) -> f64 {
        if self.index_of(resolution).is_some() {
            return resolution;
        }
        let mut distance = f64::INFINITY;
        let mut best = self.finest();
        for res in self.resolutions.iter().rev().copied() {
            let d = (res - resolution).abs();
            if d > distance {
                break;
            }
            distance = d;
            best = res;
        }
        best
    }

    /// Scale denominator at `zoom` for the given units
    pub fn scale_for_zoom(&self, zoom: f64, units: Units, fractional: bool) -> Option<f64> {
        self.resolution_for_zoom(zoom, fractional)
            .map(|res| units.scale_from_resolution(res))
    }
}

impl TryFrom<Vec<f64>> for ResolutionLadder {
    type Error = MapError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        ResolutionLadder::new(values)
    }
}

impl From<ResolutionLadder> for Vec<f64> {
    fn from(ladder: ResolutionLadder) -> Self {
        ladder.resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_levels() -> ResolutionLadder {
        ResolutionLadder::new(vec![0.703125, 0.3515625, 0.17578125]).unwrap()
    }

    #[test]
    fn test_zoom_for_resolution_default_and_closest() {
        let ladder = three_levels();
        assert_eq!(ladder.zoom_for_resolution(0.3, false, false), Some(1.0));
        assert_eq!(ladder.zoom_for_resolution(0.3, true, false), Some(1.0));
        assert_eq!(ladder.zoom_for_resolution(0.2, true, false), Some(2.0));
        assert_eq!(ladder.zoom_for_resolution(0.2, false, false), Some(1.0));
    }

    #[test]
    fn test_zoom_for_resolution_outside_ladder() {
        let ladder = three_levels();
        assert_eq!(ladder.zoom_for_resolution(10.0, false, false), Some(0.0));
        assert_eq!(ladder.zoom_for_resolution(0.01, false, false), Some(2.0));
        assert_eq!(ladder.zoom_for_resolution(f64::NAN, false, false), None);
    }

    #[test]
    fn test_zoom_resolution_round_trip() {
        let ladder = ResolutionLadder::from_range(Some(156543.03390625), None, 20).unwrap();
        for z in 0..ladder.len() {
            let res = ladder.resolution_for_zoom(z as f64, false).unwrap();
            assert_eq!(ladder.zoom_for_resolution(res, false, false), Some(z as f64));
            assert_eq!(ladder.zoom_for_resolution(res, true, false), Some(z as f64));
        }
    }

    #[test]
    fn test_out_of_range_zoom_is_none() {
        let ladder = three_levels();
        assert_eq!(ladder.resolution_for_zoom(3.0, false), None);
        assert_eq!(ladder.resolution_for_zoom(-1.0, false), None);
        assert_eq!(ladder.resolution_for_zoom(2.0, false), Some(0.17578125));
    }

    #[test]
    fn test_fractional_interpolation() {
        let ladder = three_levels();
        let res = ladder.resolution_for_zoom(0.5, true).unwrap();
        assert!((res - 0.52734375).abs() < 1e-12);
        let zoom = ladder.zoom_for_resolution(res, false, true).unwrap();
        assert!((zoom - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ladder_is_sorted_descending() {
        let ladder = ResolutionLadder::new(vec![1.0, 4.0, 2.0]).unwrap();
        assert_eq!(ladder.as_slice(), &[4.0, 2.0, 1.0]);
        assert!(ResolutionLadder::new(vec![]).is_err());
        assert!(ResolutionLadder::new(vec![1.0, -2.0]).is_err());
        assert!(ResolutionLadder::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_range_with_both_bounds() {
        let ladder = ResolutionLadder::from_range(Some(16.0), Some(1.0), 5).unwrap();
        let expected = [16.0, 8.0, 4.0, 2.0, 1.0];
        for (got, want) in ladder.as_slice().iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_range_from_min_only() {
        let ladder = ResolutionLadder::from_range(None, Some(1.0), 3).unwrap();
        assert_eq!(ladder.as_slice(), &[4.0, 2.0, 1.0]);
    }

    #[test]
    fn test_scales_to_resolutions() {
        let ladder = ResolutionLadder::from_scales(&[50_000.0, 25_000.0], Units::M).unwrap();
        let expected = 1.0 / ((1.0 / 50_000.0) * 39.37 * 72.0);
        assert!((ladder.coarsest() - expected).abs() < 1e-9);
        let scale = ladder.scale_for_zoom(0.0, Units::M, false).unwrap();
        assert!((scale - 50_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_auto_fit() {
        let extent = Bounds::new(-180.0, -90.0, 180.0, 90.0);
        let ladder = ResolutionLadder::auto_fit(&extent, Size::new(256.0, 256.0), 3).unwrap();
        assert_eq!(ladder.coarsest(), 1.40625);
        assert_eq!(ladder.finest(), 0.3515625);
    }

    #[test]
    fn test_closest_server_resolution() {
        let ladder = ResolutionLadder::new(vec![4.0, 2.0, 1.0]).unwrap();
        assert_eq!(ladder.closest(2.0), 2.0);
        assert_eq!(ladder.closest(1.4), 1.0);
        assert_eq!(ladder.closest(1.6), 2.0);
        assert_eq!(ladder.closest(100.0), 4.0);
    }

    #[test]
    fn test_units_serde_aliases() {
        let u: Units = serde_json::from_str("\"dd\"").unwrap();
        assert_eq!(u, Units::Degrees);
        let u: Units = serde_json::from_str("\"m\"").unwrap();
        assert_eq!(u, Units::M);
    }
}
