//! Tiled capture of a tall scrollable region and lossless stitching.
//!
//! The region is photographed one viewport at a time from the top. Each
//! capture advances the offset by the captured height, so the last capture
//! usually overlaps content already photographed; that overlap is cut from
//! the top of the last tile before the tiles are stacked into one image.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage, imageops};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::error::{Result, ScrapeError};
use crate::page::{ElementRef, ScrollSurface};

/// File name of the stitched image inside the capture directory.
pub const COMPOSITE_FILE: &str = "stitchedimage.png";

/// One captured viewport and the offset it was captured at.
#[derive(Debug, Clone)]
pub struct Tile {
    pub offset: u64,
    pub image: DynamicImage,
}

impl Tile {
    /// `screen_<offset>.png`; unique within a capture because offsets only grow.
    pub fn file_name(&self) -> String {
        format!("screen_{}.png", self.offset)
    }
}

/// What a capture run left on disk.
#[derive(Debug)]
pub struct StitchOutcome {
    pub extent: u64,
    pub tile_files: Vec<PathBuf>,
    /// Pixels cut from the top of the last tile.
    pub trimmed: u32,
    pub composite: Option<PathBuf>,
    pub composite_height: u32,
}

#[derive(Debug)]
pub struct ScreenshotStitcher<'a> {
    out_dir: &'a Path,
    composite: bool,
}

impl<'a> ScreenshotStitcher<'a> {
    /// # Arguments
    ///
    /// * `out_dir` - Directory receiving `screen_<offset>.png` tiles and the composite
    /// * `composite` - Whether to write the stitched image
    pub fn new(out_dir: &'a Path, composite: bool) -> Self {
        Self { out_dir, composite }
    }

    /// Capture `region` top to bottom, persist the tiles and optionally stitch them.
    ///
    /// # Errors
    ///
    /// Accessor failures, undecodable or zero-height captures, and
    /// filesystem/encoding errors while saving.
    #[instrument(level = "info", skip_all, fields(%region, out_dir = %self.out_dir.display()))]
    pub async fn capture<S: ScrollSurface>(
        &self,
        surface: &S,
        region: &ElementRef,
    ) -> Result<StitchOutcome> {
        fs::create_dir_all(self.out_dir).await?;

        surface.drive_to(region, 0).await?;
        let extent = surface.extent(region).await?;

        let mut tiles: Vec<Tile> = Vec::new();
        let mut tile_files = Vec::new();
        let mut offset = 0u64;
        while offset < extent {
            surface.drive_to(region, offset).await?;
            let bytes = surface.capture_bitmap(region).await?;
            let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
            if image.height() == 0 {
                return Err(ScrapeError::Driver(format!(
                    "zero-height capture of {region} at offset {offset}"
                )));
            }

            let tile = Tile { offset, image };
            let path = self.out_dir.join(tile.file_name());
            tile.image.save_with_format(&path, ImageFormat::Png)?;
            debug!(offset, height = tile.image.height(), path = %path.display(), "Captured tile");
            tile_files.push(path);

            offset += u64::from(tile.image.height());
            tiles.push(tile);
        }
        info!(tiles = tiles.len(), extent, "Captured all tiles");

        let extra = offset.saturating_sub(extent);
        let trimmed = if tiles.len() > 1 && extra > 0 {
            let dpr = surface.device_pixel_ratio().await?;
            trim_overlap(&mut tiles, extra, dpr)
        } else {
            0
        };

        let mut outcome = StitchOutcome {
            extent,
            tile_files,
            trimmed,
            composite: None,
            composite_height: 0,
        };
        if self.composite && !tiles.is_empty() {
            let stitched = compose(&tiles);
            let path = self.out_dir.join(COMPOSITE_FILE);
            stitched.save_with_format(&path, ImageFormat::Png)?;
            info!(
                width = stitched.width(),
                height = stitched.height(),
                path = %path.display(),
                "Wrote stitched image"
            );
            outcome.composite_height = stitched.height();
            outcome.composite = Some(path);
        }
        Ok(outcome)
    }
}

/// Cut `extra` logical pixels (scaled by `dpr`) from the top of the last tile.
///
/// A last tile that would be cut entirely is dropped. Returns the number of
/// physical pixels removed.
pub fn trim_overlap(tiles: &mut Vec<Tile>, extra: u64, dpr: f64) -> u32 {
    let Some(last) = tiles.last_mut() else {
        return 0;
    };
    let height = last.image.height();
    let cut = ((extra as f64) * dpr).round().clamp(0.0, f64::from(height)) as u32;
    if cut >= height {
        tiles.pop();
    } else if cut > 0 {
        last.image = last.image.crop_imm(0, cut, last.image.width(), height - cut);
    }
    debug!(extra, dpr, cut, "Trimmed overlap from last tile");
    cut
}

/// Stack tiles vertically at x = 0, using the first tile's width.
pub fn compose(tiles: &[Tile]) -> RgbImage {
    let width = tiles.first().map_or(0, |t| t.image.width());
    let height = tiles.iter().map(|t| t.image.height()).sum();
    let mut canvas = RgbImage::new(width, height);
    let mut y = 0i64;
    for tile in tiles {
        imageops::replace(&mut canvas, &tile.image.to_rgb8(), 0, y);
        y += i64::from(tile.image.height());
    }
    canvas
}
