//! Tile URL builders
//!
//! A layer asks its [`TileService`] for the URL of every tile it draws. The
//! grid only hands over the tile bounds plus a [`TileRequestContext`]; how
//! those become a request (template path, KVP query) is up to the service.

use crate::core::bounds::Bounds;
use crate::core::constants::BBOX_PRECISION;
use crate::core::geo::{Point, Size};
use crate::prelude::Arc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a URL builder knows about the request besides the tile bounds
#[derive(Debug, Clone)]
pub struct TileRequestContext<'a> {
    /// Map resolution
    pub resolution: f64,
    /// Resolution the tile is requested at
    pub server_resolution: f64,
    /// Zoom level in the service's numbering
    pub server_zoom: i64,
    pub max_extent: &'a Bounds,
    pub tile_size: Size,
    pub wrap_date_line: bool,
    pub projection: &'a str,
    /// The projection lists northing before easting
    pub reverse_axis: bool,
}

/// Turns tile bounds into a request URL; `None` means nothing to request
pub trait TileUrlBuilder: Send + Sync {
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String>;
}

impl<F> TileUrlBuilder for F
where
    F: Fn(&Bounds, &TileRequestContext<'_>) -> Option<String> + Send + Sync,
{
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String> {
        self(bounds, ctx)
    }
}

/// Slippy-map template service (`{z}/{x}/{y}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XyzService {
    /// Template with `{x}`, `{y}`, `{-y}`, `{z}` and `{s}` placeholders
    pub template: String,
    #[serde(default)]
    pub subdomains: Vec<String>,
}

impl XyzService {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            subdomains: Vec::new(),
        }
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn openstreetmap() -> Self {
        Self::new("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png").with_subdomains(["a", "b", "c"])
    }

    /// Tile column, row and zoom for `bounds`, with `None` outside the tile matrix
    pub fn tile_xyz(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<(i64, i64, i64)> {
        let res = ctx.server_resolution;
        let tile_w = res * ctx.tile_size.width;
        let tile_h = res * ctx.tile_size.height;
        let extent = ctx.max_extent;

        let mut x = ((bounds.left() - extent.left()) / tile_w).round() as i64;
        let y = ((extent.top() - bounds.top()) / tile_h).round() as i64;
        let cols = (extent.width() / tile_w).round().max(1.0) as i64;
        let rows = (extent.height() / tile_h).round().max(1.0) as i64;

        if ctx.wrap_date_line {
            x = x.rem_euclid(cols);
        }
        if x < 0 || x >= cols || y < 0 || y >= rows {
            return None;
        }
        Some((x, y, ctx.server_zoom))
    }
}

impl Default for XyzService {
    fn default() -> Self {
        Self::openstreetmap()
    }
}

impl TileUrlBuilder for XyzService {
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String> {
        let (x, y, z) = self.tile_xyz(bounds, ctx)?;
        let rows = (ctx.max_extent.height() / (ctx.server_resolution * ctx.tile_size.height))
            .round() as i64;
        let mut url = self
            .template
            .replace("{x}", &x.to_string())
            .replace("{-y}", &(rows - 1 - y).to_string())
            .replace("{y}", &y.to_string())
            .replace("{z}", &z.to_string());
        if !self.subdomains.is_empty() {
            let idx = ((x + y) as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[idx]);
        }
        Some(url)
    }
}

/// OGC WMS GetMap requests, one per tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WmsService {
    pub url: String,
    pub layers: String,
    pub styles: String,
    pub format: String,
    pub version: String,
    pub transparent: Option<bool>,
    /// Extra vendor parameters appended as-is
    pub params: Vec<(String, String)>,
}

impl Default for WmsService {
    fn default() -> Self {
        Self {
            url: String::new(),
            layers: String::new(),
            styles: String::new(),
            format: "image/jpeg".to_string(),
            version: "1.1.1".to_string(),
            transparent: None,
            params: Vec::new(),
        }
    }
}

impl WmsService {
    pub fn new(url: impl Into<String>, layers: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            layers: layers.into(),
            ..Default::default()
        }
    }

    /// 1.3 and later name the CRS parameter `CRS` and honour axis order
    fn is_1_3_or_later(&self) -> bool {
        let mut parts = self.version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        (major, minor) >= (1, 3)
    }
}

impl TileUrlBuilder for WmsService {
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String> {
        let modern = self.is_1_3_or_later();
        let bbox = bounds.to_bbox_string(BBOX_PRECISION, modern && ctx.reverse_axis);
        let mut params: Vec<(String, String)> = vec![
            ("SERVICE".into(), "WMS".into()),
            ("VERSION".into(), self.version.clone()),
            ("REQUEST".into(), "GetMap".into()),
            ("LAYERS".into(), self.layers.clone()),
            ("STYLES".into(), self.styles.clone()),
            ("FORMAT".into(), self.format.clone()),
        ];
        if let Some(transparent) = self.transparent {
            params.push(("TRANSPARENT".into(), transparent.to_string().to_uppercase()));
        }
        let crs_key = if modern { "CRS" } else { "SRS" };
        params.push((crs_key.into(), ctx.projection.to_string()));
        params.push(("BBOX".into(), bbox));
        params.push(("WIDTH".into(), (ctx.tile_size.width.round() as i64).to_string()));
        params.push(("HEIGHT".into(), (ctx.tile_size.height.round() as i64).to_string()));
        params.extend(self.params.iter().cloned());

        match reqwest::Url::parse_with_params(&self.url, &params) {
            Ok(url) => Some(url.into()),
            Err(err) => {
                log::warn!("invalid WMS endpoint {}: {}", self.url, err);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WmtsEncoding {
    #[default]
    Kvp,
    Rest,
}

/// One entry of a WMTS tile matrix set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsMatrix {
    pub identifier: String,
    /// Matrix top-left corner when it differs from the layer max extent's
    #[serde(default)]
    pub top_left_corner: Option<Point>,
}

/// OGC WMTS GetTile requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WmtsService {
    /// Endpoint for KVP, or a template with `{TileMatrix}`-style placeholders for REST
    pub url: String,
    pub layer: String,
    pub style: String,
    pub matrix_set: String,
    pub format: String,
    pub version: String,
    pub encoding: WmtsEncoding,
    /// Matrix per server zoom; when absent the zoom itself is the identifier
    pub matrix_ids: Option<Vec<WmtsMatrix>>,
    pub dimensions: Vec<(String, String)>,
}

impl Default for WmtsService {
    fn default() -> Self {
        Self {
            url: String::new(),
            layer: String::new(),
            style: String::new(),
            matrix_set: String::new(),
            format: "image/jpeg".to_string(),
            version: "1.0.0".to_string(),
            encoding: WmtsEncoding::default(),
            matrix_ids: None,
            dimensions: Vec::new(),
        }
    }
}

impl WmtsService {
    fn matrix(&self, zoom: i64) -> Option<(String, Option<Point>)> {
        match &self.matrix_ids {
            Some(ids) => {
                let matrix = ids.get(usize::try_from(zoom).ok()?)?;
                Some((matrix.identifier.clone(), matrix.top_left_corner))
            }
            None => Some((zoom.to_string(), None)),
        }
    }

    /// Matrix identifier, row and column of the tile holding the center of `bounds`
    pub fn tile_index(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<(String, i64, i64)> {
        let (matrix, corner) = self.matrix(ctx.server_zoom)?;
        let origin = corner.unwrap_or_else(|| ctx.max_extent.top_left());
        let center = bounds.center();
        let res = ctx.server_resolution;
        let col = ((center.x - origin.x) / (res * ctx.tile_size.width)).floor() as i64;
        let row = ((origin.y - center.y) / (res * ctx.tile_size.height)).floor() as i64;
        if col < 0 || row < 0 {
            return None;
        }
        Some((matrix, row, col))
    }
}

impl TileUrlBuilder for WmtsService {
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String> {
        let (matrix, row, col) = self.tile_index(bounds, ctx)?;
        match self.encoding {
            WmtsEncoding::Rest => {
                let mut url = self
                    .url
                    .replace("{TileMatrixSet}", &self.matrix_set)
                    .replace("{TileMatrix}", &matrix)
                    .replace("{TileRow}", &row.to_string())
                    .replace("{TileCol}", &col.to_string())
                    .replace("{Style}", &self.style)
                    .replace("{style}", &self.style);
                for (name, value) in &self.dimensions {
                    url = url.replace(&format!("{{{}}}", name), value);
                }
                Some(url)
            }
            WmtsEncoding::Kvp => {
                let mut params: Vec<(String, String)> = vec![
                    ("SERVICE".into(), "WMTS".into()),
                    ("REQUEST".into(), "GetTile".into()),
                    ("VERSION".into(), self.version.clone()),
                    ("LAYER".into(), self.layer.clone()),
                    ("STYLE".into(), self.style.clone()),
                    ("TILEMATRIXSET".into(), self.matrix_set.clone()),
                    ("TILEMATRIX".into(), matrix),
                    ("TILEROW".into(), row.to_string()),
                    ("TILECOL".into(), col.to_string()),
                    ("FORMAT".into(), self.format.clone()),
                ];
                params.extend(
                    self.dimensions
                        .iter()
                        .map(|(name, value)| (name.to_uppercase(), value.clone())),
                );
                match reqwest::Url::parse_with_params(&self.url, &params) {
                    Ok(url) => Some(url.into()),
                    Err(err) => {
                        log::warn!("invalid WMTS endpoint {}: {}", self.url, err);
                        None
                    }
                }
            }
        }
    }
}

/// URL scheme of a grid layer
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TileService {
    Xyz(XyzService),
    Wms(WmsService),
    Wmts(WmtsService),
    /// Opaque builder supplied in code
    #[serde(skip)]
    Custom(Arc<dyn TileUrlBuilder>),
}

impl TileService {
    pub fn custom<B: TileUrlBuilder + 'static>(builder: B) -> Self {
        TileService::Custom(Arc::new(builder))
    }
}

impl TileUrlBuilder for TileService {
    fn url(&self, bounds: &Bounds, ctx: &TileRequestContext<'_>) -> Option<String> {
        match self {
            TileService::Xyz(service) => service.url(bounds, ctx),
            TileService::Wms(service) => service.url(bounds, ctx),
            TileService::Wmts(service) => service.url(bounds, ctx),
            TileService::Custom(builder) => builder.url(bounds, ctx),
        }
    }
}

impl fmt::Debug for TileService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileService::Xyz(service) => f.debug_tuple("Xyz").field(service).finish(),
            TileService::Wms(service) => f.debug_tuple("Wms").field(service).finish(),
            TileService::Wmts(service) => f.debug_tuple("Wmts").field(service).finish(),
            TileService::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Default for TileService {
    fn default() -> Self {
        TileService::Xyz(XyzService::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::MERCATOR_POLE;

    fn world() -> Bounds {
        Bounds::new(-MERCATOR_POLE, -MERCATOR_POLE, MERCATOR_POLE, MERCATOR_POLE)
    }

    fn ctx(extent: &Bounds, zoom: i64) -> TileRequestContext<'_> {
        let res = extent.width() / 256.0 / 2f64.powi(zoom as i32);
        TileRequestContext {
            resolution: res,
            server_resolution: res,
            server_zoom: zoom,
            max_extent: extent,
            tile_size: Size::square(256.0),
            wrap_date_line: false,
            projection: "EPSG:3857",
            reverse_axis: false,
        }
    }

    fn tile_bounds(extent: &Bounds, zoom: i64, x: i64, y: i64) -> Bounds {
        let span = extent.width() / 2f64.powi(zoom as i32);
        let left = extent.left() + x as f64 * span;
        let top = extent.top() - y as f64 * span;
        Bounds::new(left, top - span, left + span, top)
    }

    #[test]
    fn test_xyz_url() {
        let extent = world();
        let ctx = ctx(&extent, 2);
        let service = XyzService::openstreetmap();
        let url = service.url(&tile_bounds(&extent, 2, 1, 3), &ctx).unwrap();
        assert_eq!(url, "https://b.tile.openstreetmap.org/2/1/3.png");
    }

    #[test]
    fn test_xyz_flipped_row() {
        let extent = world();
        let ctx = ctx(&extent, 2);
        let service = XyzService::new("/{z}/{x}/{-y}");
        assert_eq!(service.url(&tile_bounds(&extent, 2, 0, 0), &ctx).unwrap(), "/2/0/3");
    }

    #[test]
    fn test_xyz_outside_matrix() {
        let extent = world();
        let mut ctx = ctx(&extent, 1);
        let service = XyzService::new("{z}/{x}/{y}");
        assert!(service.url(&tile_bounds(&extent, 1, 0, 2), &ctx).is_none());
        assert!(service.url(&tile_bounds(&extent, 1, -1, 0), &ctx).is_none());

        ctx.wrap_date_line = true;
        assert_eq!(service.url(&tile_bounds(&extent, 1, -1, 0), &ctx).unwrap(), "1/1/0");
        assert_eq!(service.url(&tile_bounds(&extent, 1, 2, 1), &ctx).unwrap(), "1/0/1");
    }

    #[test]
    fn test_wms_getmap() {
        let extent = Bounds::new(-180.0, -90.0, 180.0, 90.0);
        let mut ctx = ctx(&extent, 0);
        ctx.projection = "EPSG:4326";
        ctx.reverse_axis = true;
        let service = WmsService::new("https://example.com/wms", "roads");
        let bounds = Bounds::new(0.0, 10.0, 20.0, 30.0);

        let url = service.url(&bounds, &ctx).unwrap();
        assert!(url.starts_with("https://example.com/wms?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap"));
        assert!(url.contains("SRS=EPSG%3A4326"));
        assert!(url.contains("BBOX=0%2C10%2C20%2C30"));
        assert!(url.contains("WIDTH=256&HEIGHT=256"));

        let modern = WmsService {
            version: "1.3.0".to_string(),
            transparent: Some(true),
            ..service
        };
        let url = modern.url(&bounds, &ctx).unwrap();
        assert!(url.contains("CRS=EPSG%3A4326"));
        assert!(url.contains("BBOX=10%2C0%2C30%2C20"));
        assert!(url.contains("TRANSPARENT=TRUE"));
    }

    #[test]
    fn test_wmts_rest_and_kvp() {
        let extent = world();
        let ctx = ctx(&extent, 1);
        let bounds = tile_bounds(&extent, 1, 1, 0);
        let rest = WmtsService {
            url: "https://example.com/{Style}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}/{Time}.png"
                .to_string(),
            style: "default".to_string(),
            matrix_set: "g".to_string(),
            encoding: WmtsEncoding::Rest,
            matrix_ids: Some(vec![
                WmtsMatrix {
                    identifier: "m0".to_string(),
                    top_left_corner: None,
                },
                WmtsMatrix {
                    identifier: "m1".to_string(),
                    top_left_corner: None,
                },
            ]),
            dimensions: vec![("Time".to_string(), "2020".to_string())],
            ..Default::default()
        };
        assert_eq!(
            rest.url(&bounds, &ctx).unwrap(),
            "https://example.com/default/g/m1/0/1/2020.png"
        );

        let kvp = WmtsService {
            url: "https://example.com/wmts".to_string(),
            encoding: WmtsEncoding::Kvp,
            ..rest
        };
        let url = kvp.url(&bounds, &ctx).unwrap();
        assert!(url.contains("TILEMATRIX=m1&TILEROW=0&TILECOL=1"));
        assert!(url.contains("TIME=2020"));
    }

    #[test]
    fn test_wmts_zoom_without_matrix() {
        let extent = world();
        let ctx = ctx(&extent, 3);
        let service = WmtsService {
            matrix_ids: Some(vec![]),
            ..Default::default()
        };
        assert!(service.url(&tile_bounds(&extent, 3, 0, 0), &ctx).is_none());
    }

    #[test]
    fn test_custom_builder_and_serde() {
        let service = TileService::custom(|b: &Bounds, _: &TileRequestContext<'_>| {
            Some(format!("tile-{}", b.left()))
        });
        let extent = world();
        assert_eq!(
            service
                .url(&Bounds::new(1.0, 0.0, 2.0, 1.0), &ctx(&extent, 0))
                .unwrap(),
            "tile-1"
        );

        let json = r#"{"type":"xyz","template":"{z}/{x}/{y}"}"#;
        let parsed: TileService = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, TileService::Xyz(ref s) if s.subdomains.is_empty()));
    }
}
