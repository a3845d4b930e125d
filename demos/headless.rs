use std::thread;
use std::time::Duration;

use tilekit::{DownloaderConfig, MapSource, MapSourceConfig, MapView};

/// Example of using tilekit in headless mode without any renderer: drive the
/// viewport, poll for ready tiles, and print what a renderer would paint.
fn main() -> tilekit::Result<()> {
    env_logger::init();

    println!("available providers: {:?}", MapSource::provider_keys());

    let mut view = MapView::new(
        MapSourceConfig::Preset("osm".to_string()),
        DownloaderConfig::default(),
        5,
        800.0,
        600.0,
    )?;

    // Lille, France
    view.center_on(50.6394, 3.057);
    println!(
        "viewing {:.4}, {:.4} at zoom {} ({} tiles in range)",
        view.center().lat,
        view.center().lng,
        view.zoom(),
        view.tiles().len()
    );

    // Poll the way a render loop would, once per frame
    let mut painted = 0;
    for _ in 0..600 {
        for tile in view.drain() {
            painted += 1;
            println!(
                "ready: {:?} at ({:.0}, {:.0}) -> {}",
                tile.coord,
                tile.screen_position.x,
                tile.screen_position.y,
                tile.path.display()
            );
        }
        if painted == view.tiles().len() {
            break;
        }
        thread::sleep(Duration::from_millis(16));
    }
    println!("painted {}/{} tiles", painted, view.tiles().len());

    // Pan east and pick up the newly visible column
    view.pan_by(300.0, 0.0);
    for _ in 0..600 {
        for tile in view.drain() {
            println!("ready after pan: {:?}", tile.coord);
        }
        if view.tiles().iter().all(|t| t.is_done()) {
            break;
        }
        thread::sleep(Duration::from_millis(16));
    }

    view.unload();
    Ok(())
}
