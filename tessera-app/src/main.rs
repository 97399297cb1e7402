use fxhash::FxHashMap;
use serde::Deserialize;
use std::time::Duration;
use tessera::{
    core::{config::GridLayerOptions, geo::Point, geo::Size, map::PanOptions},
    layers::tile::{GridLayer, HttpSource, SpawnFetcher, TileService},
    prelude::{Arc, Instant},
    Map, MapEvent, MapOptions,
};

/// A scripted map session: the map, its layers and the moves to replay
#[derive(Debug, Deserialize)]
struct Session {
    #[serde(default)]
    map: MapOptions,
    layers: Vec<LayerConfig>,
    #[serde(default)]
    steps: Vec<Step>,
    /// Longest wait for a step's tiles to settle
    #[serde(default = "default_settle_ms")]
    settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize)]
struct LayerConfig {
    options: GridLayerOptions,
    service: TileService,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Center { x: f64, y: f64, zoom: Option<f64> },
    Pan { dx: f64, dy: f64, #[serde(default)] animate: bool },
    Drag { dx: f64, dy: f64 },
    Zoom { level: f64 },
    ZoomIn,
    ZoomOut,
    MaxExtent,
    Resize { width: f64, height: f64 },
    BaseLayer { id: String },
}

/// Built-in session: OpenStreetMap around San Francisco
fn default_session() -> Session {
    Session {
        map: MapOptions {
            size: Size::new(1024.0, 768.0),
            ..Default::default()
        },
        layers: vec![LayerConfig {
            options: GridLayerOptions::new("osm"),
            service: TileService::default(),
        }],
        steps: vec![
            Step::Center {
                x: -13_627_361.0,
                y: 4_547_675.0,
                zoom: Some(12.0),
            },
            Step::Drag { dx: 300.0, dy: 0.0 },
            Step::Drag { dx: 0.0, dy: -200.0 },
            Step::ZoomIn,
            Step::Pan {
                dx: 200.0,
                dy: 100.0,
                animate: true,
            },
            Step::ZoomOut,
        ],
        settle_ms: default_settle_ms(),
    }
}

fn load_session() -> Result<Session, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            log::info!("loaded session from {}", path);
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(default_session()),
    }
}

fn apply(map: &mut Map, step: &Step) -> tessera::Result<()> {
    match step {
        Step::Center { x, y, zoom } => {
            map.set_center(Point::new(*x, *y), *zoom);
        }
        Step::Pan { dx, dy, animate } => {
            map.pan(
                *dx,
                *dy,
                PanOptions {
                    animate: *animate,
                    dragging: false,
                },
            );
        }
        Step::Drag { dx, dy } => {
            map.move_by_px(*dx, *dy);
            map.end_drag();
        }
        Step::Zoom { level } => {
            map.zoom_to(*level);
        }
        Step::ZoomIn => {
            map.zoom_in();
        }
        Step::ZoomOut => {
            map.zoom_out();
        }
        Step::MaxExtent => {
            map.zoom_to_max_extent();
        }
        Step::Resize { width, height } => {
            map.update_size(Size::new(*width, *height));
        }
        Step::BaseLayer { id } => map.set_base_layer(id)?,
    }
    Ok(())
}

/// Pumps the map until animation and tile loading have settled
async fn settle(map: &mut Map, limit: Duration, tally: &mut FxHashMap<&'static str, usize>) {
    let deadline = Instant::now() + limit;
    loop {
        map.update(Instant::now());
        for event in map.process_events() {
            if let MapEvent::TileError { tile, error, .. } = &event {
                log::warn!("{} failed: {}", tile, error);
            }
            *tally.entry(event.event_type()).or_default() += 1;
        }
        if !map.is_animating() && !map.is_loading() {
            break;
        }
        if Instant::now() >= deadline {
            log::warn!("gave up waiting for tiles after {:?}", limit);
            break;
        }
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
}

async fn run(session: Session) -> Result<(), Box<dyn std::error::Error>> {
    let mut map = Map::with_default_registry(session.map)?;
    let source = HttpSource::with_user_agent(
        concat!("tessera-app/", env!("CARGO_PKG_VERSION")),
        Duration::from_secs(10),
    )?;
    let fetcher = Arc::new(SpawnFetcher::current(source)?);

    for layer in session.layers {
        let grid = GridLayer::new(layer.options, layer.service, fetcher.clone())?;
        map.add_layer(Box::new(grid))?;
    }

    let limit = Duration::from_millis(session.settle_ms);
    let mut tally = FxHashMap::default();
    for (i, step) in session.steps.iter().enumerate() {
        apply(&mut map, step)?;
        settle(&mut map, limit, &mut tally).await;
        println!(
            "step {:>2} {:<40} zoom {:>4} resolution {:>12.4} center {:?}",
            i + 1,
            format!("{:?}", step),
            map.zoom(),
            map.resolution().unwrap_or(f64::NAN),
            map.center()
        );
    }

    let mut counts: Vec<_> = tally.into_iter().collect();
    counts.sort();
    println!("\nevents:");
    for (kind, count) in counts {
        println!("  {:<18} {}", kind, count);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let session = load_session()?;

    tokio::select! {
        result = run(session) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted");
            Ok(())
        }
    }
}
