use tessera::prelude::*;

/// Example of driving tessera headless, completing tile requests by hand
fn main() -> tessera::Result<()> {
    println!("🗺️ Tessera Headless Example");
    println!("===========================");

    let fetcher = QueuedFetcher::new();
    let mut map = Map::with_default_registry(MapOptions {
        size: Size::new(1024.0, 768.0),
        ..Default::default()
    })?;

    let osm = GridLayer::new(
        GridLayerOptions {
            buffer: 1,
            ..GridLayerOptions::new("osm")
        },
        TileService::default(),
        Arc::new(fetcher.clone()),
    )?;
    map.add_layer(Box::new(osm))?;
    println!("✅ Added OpenStreetMap grid layer");

    // San Francisco, in spherical mercator metres
    let registry = ProjectionRegistry::with_defaults();
    let center = registry.transform_point(Point::new(-122.4194, 37.7749), "EPSG:4326", "EPSG:3857");
    map.set_center(center, Some(12.0));

    println!("✅ Map centered:");
    println!("   Zoom: {}", map.zoom());
    println!("   Resolution: {:.4} m/px", map.resolution().unwrap_or_default());
    println!("   Scale: 1:{:.0}", map.scale().unwrap_or_default());
    println!("   Requests queued: {}", fetcher.pending_count());
    for url in fetcher.pending_urls().iter().take(3) {
        println!("   → {}", url);
    }

    // Pretend the server answered every request
    let served = fetcher.complete_all(|url| Ok(Arc::new(url.as_bytes().to_vec())));
    let applied = map.update(Instant::now());
    println!("\n📦 Served {} tiles, {} applied", served, applied);

    println!("\n🚀 Dragging:");
    for (dx, dy) in [(300.0, 0.0), (0.0, 300.0), (-150.0, -150.0)] {
        map.move_by_px(dx, dy);
        println!(
            "   Drag by ({}, {}) - {} new requests",
            dx,
            dy,
            fetcher.pending_count()
        );
        fetcher.complete_all(|_| Ok(Arc::new(Vec::new())));
        map.update(Instant::now());
    }
    map.end_drag();

    println!("\n🔍 Zooming:");
    for zoom in [13.0, 11.0, 12.0] {
        map.zoom_to(zoom);
        let layer = map.layer_as::<GridLayer>("osm");
        let buffered = layer.and_then(|l| l.back_buffer()).map_or(0, |b| b.tiles().len());
        println!(
            "   Zoom {} - {} requests, back buffer holds {} tiles",
            zoom,
            fetcher.pending_count(),
            buffered
        );
        fetcher.complete_all(|_| Ok(Arc::new(Vec::new())));
        map.update(Instant::now());
    }

    println!("\n📣 Events:");
    let mut counts: HashMap<&'static str, usize> = HashMap::default();
    for event in map.process_events() {
        *counts.entry(event.event_type()).or_default() += 1;
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort();
    for (kind, count) in counts {
        println!("   {:<18} {}", kind, count);
    }

    println!("\n🎉 Headless example completed successfully!");
    Ok(())
}
