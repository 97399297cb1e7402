#[cfg(test)]
mod properties_test {
    use tessera::prelude::*;

    #[test]
    fn test_bounds_add_round_trip() {
        let bounds = Bounds::new(-12.5, 3.0, 40.25, 77.0);
        for (x, y) in [(0.0, 0.0), (10.0, -5.0), (-1e6, 3.5e5), (0.1, 0.2)] {
            let back = bounds.add(x, y).add(-x, -y);
            assert!((back.left() - bounds.left()).abs() < 1e-6);
            assert!((back.bottom() - bounds.bottom()).abs() < 1e-6);
            assert!((back.right() - bounds.right()).abs() < 1e-6);
            assert!((back.top() - bounds.top()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mercator_round_trip() {
        let registry = ProjectionRegistry::with_defaults();
        for (lon, lat) in [(0.0, 0.0), (-122.4194, 37.7749), (151.2, -33.87), (179.9, 84.0)] {
            let there = registry.transform_point(Point::new(lon, lat), "EPSG:4326", "EPSG:3857");
            let back = registry.transform_point(there, "EPSG:3857", "EPSG:4326");
            assert!((back.x - lon).abs() < 1e-9, "{} {}", lon, lat);
            assert!((back.y - lat).abs() < 1e-9, "{} {}", lon, lat);
        }
    }

    #[test]
    fn test_zoom_resolution_bijection() {
        let ladder = ResolutionLadder::new(vec![0.703125, 0.3515625, 0.17578125]).unwrap();
        for zoom in 0..ladder.len() {
            let res = ladder.resolution_for_zoom(zoom as f64, false).unwrap();
            assert_eq!(ladder.zoom_for_resolution(res, false, false), Some(zoom as f64));
            assert_eq!(ladder.zoom_for_resolution(res, true, false), Some(zoom as f64));
        }
        assert_eq!(ladder.zoom_for_resolution(0.3, false, false), Some(1.0));
        assert_eq!(ladder.zoom_for_resolution(0.3, true, false), Some(1.0));
    }

    #[test]
    fn test_wrap_across_date_line() {
        let world = Bounds::new(-180.0, -90.0, 180.0, 90.0);
        let wrapped = Bounds::new(-190.0, -10.0, -185.0, 10.0).wrap_date_line(&world, WrapTolerance::default());
        assert_eq!(wrapped, Bounds::new(170.0, -10.0, 175.0, 10.0));
    }

    #[test]
    fn test_pixel_conversions_are_inverse() {
        let ladder = ResolutionLadder::new(vec![2.0, 1.0, 0.5]).unwrap();
        let mut viewport = Viewport::new(Size::new(640.0, 480.0), Bounds::new(-5000.0, -5000.0, 5000.0, 5000.0))
            .with_ladder(ladder);
        viewport.move_to(Some(Point::new(120.0, -40.0)), Some(1.0), MoveOptions::default());
        viewport.move_by_px(37.0, -12.0);

        for px in [PixelPoint::new(0.0, 0.0), PixelPoint::new(320.0, 240.0), PixelPoint::new(639.0, 11.0)] {
            let lonlat = viewport.viewport_px_to_lonlat(px).unwrap();
            let back = viewport.lonlat_to_viewport_px(&lonlat).unwrap();
            assert!((back.x - px.x).abs() < 1e-6);
            assert!((back.y - px.y).abs() < 1e-6);

            let layer_px = viewport.viewport_px_to_layer_px(px);
            let again = viewport.layer_px_to_lonlat(layer_px).unwrap();
            assert!((again.x - lonlat.x).abs() < 1e-6);
            assert!((again.y - lonlat.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_layer_options_from_json() {
        let options = GridLayerOptions::from_json(
            r#"{"id": "ortho", "buffer": 2, "tile_origin_corner": "tl", "loading": {"max_retries": 1}}"#,
        )
        .unwrap();
        assert_eq!(options.buffer(), 2);
        assert_eq!(options.tile_origin_corner, TileOriginCorner::Tl);
        assert_eq!(options.loading.max_retries, 1);
        assert_eq!(options.tile_size, Size::square(256.0));

        assert!(GridLayerOptions::from_json(r#"{"id": "bad", "buffer": -1}"#).is_err());
    }
}
