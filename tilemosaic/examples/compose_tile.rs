//! This example composes one tile covering an arbitrary region from OpenStreetMap tiles and
//! saves it to a file.
//!
//! ```shell
//! cargo run --example compose_tile -- 35 60 -10 30 europe.png
//! ```
//!
//! Arguments are the region bounds (min latitude, max latitude, min longitude, max longitude)
//! and the output file name.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tilemosaic::tilemosaic_types::cartesian::{Point2, Size};
use tilemosaic::tilemosaic_types::geo::GeoRegion;
use tilemosaic::{
    CompositeTileFactory, Crs, DispatcherBuilder, TileContent, TileMatrix, TileMatrixSet,
    UrlTemplate, WmtsLayer,
};

const MERCATOR_EDGE: f64 = 20037508.3427892;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (region, output) = match args.as_slice() {
        [] => (GeoRegion::new(35.0, 60.0, -10.0, 30.0), "tile.png".to_string()),
        [min_lat, max_lat, min_lon, max_lon, output] => (
            GeoRegion::new(
                min_lat.parse()?,
                max_lat.parse()?,
                min_lon.parse()?,
                max_lon.parse()?,
            ),
            output.clone(),
        ),
        _ => {
            return Err(anyhow!(
                "Expected either no arguments or: MIN_LAT MAX_LAT MIN_LON MAX_LON OUTPUT"
            ))
        }
    };
    let region = region.ok_or_else(|| anyhow!("Region bounds are invalid"))?;

    let layer = WmtsLayer::new(
        "osm",
        GeoRegion::new(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT, -180.0, 180.0),
    );

    let dispatcher = DispatcherBuilder::new_http()
        .with_max_concurrent_fetches(2)
        .build()?;
    let factory = CompositeTileFactory::new(
        dispatcher.clone(),
        Arc::new(layer),
        Arc::new(google_maps_compatible(12)),
        UrlTemplate::new("https://tile.openstreetmap.org/{TileMatrix}/{TileCol}/{TileRow}.png"),
    )
    .with_tile_size(Size::new(512, 512));

    let level = level_for_region(&region);
    log::info!("Composing {region:?} at level {level}");

    let started = Instant::now();
    let tile = factory.create_tile(region, level, 0, 0);
    let image = match tile.wait().await {
        TileContent::Ready(image) => image,
        _ => return Err(anyhow!("Tile could not be composed")),
    };

    if let Some(stats) = dispatcher.stats().await {
        log::info!(
            "Composed in {:?} with {} raw tile transfers",
            started.elapsed(),
            stats.fetches_issued
        );
    }

    (*image)
        .clone()
        .into_rgba_image()
        .context("Composed image has an inconsistent buffer")?
        .save(&output)?;
    log::info!("Saved {output}");

    Ok(())
}

fn google_maps_compatible(levels: u32) -> TileMatrixSet {
    let matrices = (0..levels)
        .map(|z| {
            TileMatrix::new(
                z.to_string(),
                559_082_264.028_717_8 / 2f64.powi(z as i32),
                Point2::new(-MERCATOR_EDGE, MERCATOR_EDGE),
                Size::new(256, 256),
                Size::new(1 << z, 1 << z),
            )
        })
        .collect();

    TileMatrixSet::new("GoogleMapsCompatible", Crs::Epsg3857, matrices)
}

/// Level of a pyramid with a 90 degree first level that has tiles about as wide as the region.
fn level_for_region(region: &GeoRegion) -> u32 {
    let ratio = 90.0 / region.delta_lon().max(region.delta_lat());
    ratio.log2().max(0.0).round() as u32
}
