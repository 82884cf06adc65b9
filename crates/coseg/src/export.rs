//! Tiled PNG export of image and mask batches.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor};
use image::{Rgb, RgbImage};

use crate::error::{TrainError, TrainResult};

/// Layout of an exported grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    /// Tiles per row.
    pub columns: usize,
    /// Pixels of black border around and between tiles.
    pub padding: usize,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 2,
            padding: 2,
        }
    }
}

/// Renders `tiles` (`[N, C, H, W]`, `C` of 1 or 3, values in `[0, 1]`) into one RGB grid.
///
/// Single-channel tiles are replicated to grey. Values outside `[0, 1]` are clamped.
pub fn grid_image<B: Backend>(tiles: Tensor<B, 4>, layout: GridLayout) -> TrainResult<RgbImage> {
    let [count, channels, height, width] = tiles.dims();
    if count == 0 {
        return Err(TrainError::TensorExport {
            reason: "no tiles to export".to_string(),
        });
    }
    if channels != 1 && channels != 3 {
        return Err(TrainError::TensorExport {
            reason: format!("expected 1 or 3 channels, got {channels}"),
        });
    }

    let values = tiles
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| TrainError::TensorExport {
            reason: format!("{err:?}"),
        })?;

    let columns = layout.columns.clamp(1, count);
    let rows = count.div_ceil(columns);
    let padding = layout.padding;
    let cell_width = width + padding;
    let cell_height = height + padding;

    let mut grid = RgbImage::new(
        (columns * cell_width + padding) as u32,
        (rows * cell_height + padding) as u32,
    );

    let plane = height * width;
    for tile in 0..count {
        let left = (tile % columns) * cell_width + padding;
        let top = (tile / columns) * cell_height + padding;
        let base = tile * channels * plane;

        for y in 0..height {
            for x in 0..width {
                let at = |channel: usize| {
                    to_byte(values[base + channel.min(channels - 1) * plane + y * width + x])
                };
                grid.put_pixel(
                    (left + x) as u32,
                    (top + y) as u32,
                    Rgb([at(0), at(1), at(2)]),
                );
            }
        }
    }

    Ok(grid)
}

/// Renders `tiles` with [`grid_image`] and writes them to `path`.
pub fn save_grid<B: Backend>(
    tiles: Tensor<B, 4>,
    layout: GridLayout,
    path: &Path,
) -> TrainResult<()> {
    grid_image(tiles, layout)?
        .save(path)
        .map_err(|source| TrainError::ImageExport {
            path: path.to_path_buf(),
            source,
        })
}

fn to_byte(value: f32) -> u8 {
    (value * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::TensorData};

    use super::*;

    type TestBackend = NdArray;

    fn tiles(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn two_tiles_share_one_padded_row() {
        let grid = grid_image(tiles(vec![1.0; 2 * 3 * 4], [2, 1, 3, 4]), GridLayout::default())
            .unwrap();

        assert_eq!(grid.dimensions(), (2 * (4 + 2) + 2, 3 + 2 + 2));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([255, 255, 255]));
        assert_eq!(grid.get_pixel(6, 2), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(8, 2), &Rgb([255, 255, 255]));
    }

    #[test]
    fn extra_tiles_wrap_to_the_next_row() {
        let grid = grid_image(tiles(vec![0.5; 3 * 2 * 2], [3, 1, 2, 2]), GridLayout::default())
            .unwrap();

        assert_eq!(grid.dimensions(), (2 * 4 + 2, 2 * 4 + 2));
        assert_eq!(grid.get_pixel(2, 6), &Rgb([128, 128, 128]));
    }

    #[test]
    fn rgb_channels_are_kept_and_values_clamped() {
        let grid = grid_image(
            tiles(vec![1.5, 0.0, -0.5], [1, 3, 1, 1]),
            GridLayout {
                columns: 2,
                padding: 0,
            },
        )
        .unwrap();

        assert_eq!(grid.dimensions(), (1, 1));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn unsupported_channel_counts_are_rejected() {
        let err = grid_image(tiles(vec![0.0; 2], [1, 2, 1, 1]), GridLayout::default()).unwrap_err();
        assert!(matches!(err, TrainError::TensorExport { .. }));
    }

    #[test]
    fn save_grid_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_0_masks.png");

        save_grid(tiles(vec![0.25; 2 * 4], [2, 1, 2, 2]), GridLayout::default(), &path).unwrap();

        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (10, 6));
    }
}
