use log::debug;
use serde::{Deserialize, Serialize};
use tabletop_core::{DepthFrameView, PlaneModel, RegionOfInterest};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::HeightGridParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightGridCell {
    /// Mean height above the table; zero below the sample minimum.
    pub avg_height_mm: i32,
    pub sample_count: u32,
}

/// Coarse raster of mean object height over the ROI, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightGrid {
    pub roi: RegionOfInterest,
    pub cell_size: usize,
    pub cols: usize,
    pub rows: usize,
    pub cells: Vec<HeightGridCell>,
}

impl HeightGrid {
    pub fn empty(roi: RegionOfInterest, cell_size: usize) -> Self {
        Self {
            roi,
            cell_size,
            cols: 0,
            rows: 0,
            cells: Vec::new(),
        }
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&HeightGridCell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    /// Cell covering frame pixel `(x, y)`.
    pub fn cell_at_pixel(&self, x: usize, y: usize) -> Option<&HeightGridCell> {
        if !self.roi.contains(x, y) || self.cell_size == 0 {
            return None;
        }
        self.cell(
            (x - self.roi.x) / self.cell_size,
            (y - self.roi.y) / self.cell_size,
        )
    }

    pub fn max_height_mm(&self) -> i32 {
        self.cells.iter().map(|c| c.avg_height_mm).max().unwrap_or(0)
    }

    /// Cells reporting a non-zero height.
    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.avg_height_mm > 0).count()
    }
}

#[derive(Clone, Debug, Default)]
pub struct HeightGridBuilder {
    params: HeightGridParams,
}

impl HeightGridBuilder {
    pub fn new(params: HeightGridParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HeightGridParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, plane), fields(roi_w = roi.width, roi_h = roi.height))
    )]
    pub fn build(
        &self,
        frame: &DepthFrameView<'_>,
        roi: &RegionOfInterest,
        plane: &PlaneModel,
    ) -> HeightGrid {
        let cell_size = self.params.cell_size_px.max(1);
        let Some(roi) = roi.clamped(frame.width, frame.height) else {
            return HeightGrid::empty(*roi, cell_size);
        };
        let cols = roi.width.div_ceil(cell_size);
        let rows = roi.height.div_ceil(cell_size);
        let mut sums = vec![0i64; cols * rows];
        let mut counts = vec![0u32; cols * rows];

        for y in roi.y..roi.bottom() {
            let row = (y - roi.y) / cell_size;
            for x in roi.x..roi.right() {
                let Some(d) = frame.sample(x, y) else {
                    continue;
                };
                let expected = plane.expected_depth(x as f64, y as f64);
                let d = d as f64;
                if d > expected + self.params.tolerance_mm {
                    continue;
                }
                // whole millimeters, so float noise on a level plane is not height
                let height = (expected - d).round() as i64;
                if height <= 0 {
                    continue;
                }
                let idx = row * cols + (x - roi.x) / cell_size;
                sums[idx] += height;
                counts[idx] += 1;
            }
        }

        let cells = sums
            .iter()
            .zip(&counts)
            .map(|(&sum, &count)| HeightGridCell {
                avg_height_mm: if count >= self.params.min_samples && count > 0 {
                    (sum as f64 / count as f64).round() as i32
                } else {
                    0
                },
                sample_count: count,
            })
            .collect();
        let grid = HeightGrid {
            roi,
            cell_size,
            cols,
            rows,
            cells,
        };
        debug!(
            "height grid: {}x{} cells, {} occupied, max {}mm",
            cols,
            rows,
            grid.occupied_cells(),
            grid.max_height_mm()
        );
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use tabletop_core::DepthFrame;

    #[test]
    fn patch_height_is_averaged_per_cell() {
        let mut frame = DepthFrame::filled(100, 80, 1000).unwrap();
        frame.fill_rect(21, 21, 5, 5, 950);
        let roi = RegionOfInterest::new(0, 0, 100, 80);
        let grid = HeightGridBuilder::default().build(&frame.view(), &roi, &PlaneModel::flat(1000));
        assert_eq!((grid.cols, grid.rows), (10, 8));
        let cell = grid.cell_at_pixel(23, 23).unwrap();
        assert_eq!(cell.avg_height_mm, 50);
        assert_eq!(cell.sample_count, 25);
        assert_eq!(grid.occupied_cells(), 1);
        assert_eq!(grid.max_height_mm(), 50);
    }

    #[test]
    fn sparse_cells_report_zero() {
        let mut frame = DepthFrame::filled(40, 40, 1000).unwrap();
        frame.set(5, 5, 900);
        frame.set(6, 5, 900);
        let grid = HeightGridBuilder::default().build(
            &frame.view(),
            &frame.view().full_roi(),
            &PlaneModel::flat(1000),
        );
        let cell = grid.cell(0, 0).unwrap();
        assert_eq!(cell.sample_count, 2);
        assert_eq!(cell.avg_height_mm, 0);
    }

    #[test]
    fn deeper_samples_are_skipped() {
        let mut frame = DepthFrame::filled(20, 20, 1000).unwrap();
        frame.fill_rect(0, 0, 10, 10, 1100);
        frame.fill_rect(10, 0, 10, 10, 0);
        let grid = HeightGridBuilder::default().build(
            &frame.view(),
            &frame.view().full_roi(),
            &PlaneModel::flat(1000),
        );
        assert!(grid.cells.iter().all(|c| c.sample_count == 0));
    }

    #[test]
    fn tilted_plane_corrects_heights() {
        // Table slopes 0.5mm per row; an object 30mm tall at row 60.
        let plane = PlaneModel {
            normal: Vector3::new(0.0, -0.5, 1.0).normalize(),
            origin: Point3::new(0.0, 40.0, 1000.0),
        };
        let mut frame = DepthFrame::filled(80, 80, 0).unwrap();
        for y in 0..80 {
            for x in 0..80 {
                frame.set(x, y, plane.expected_depth(x as f64, y as f64).round() as u16);
            }
        }
        let on_table = plane.expected_depth(0.0, 60.0).round() as u16;
        frame.fill_rect(30, 60, 10, 1, on_table - 30);
        let grid = HeightGridBuilder::default().build(&frame.view(), &frame.view().full_roi(), &plane);
        assert_eq!(grid.cell_at_pixel(35, 60).unwrap().avg_height_mm, 30);
        assert_eq!(grid.occupied_cells(), 1);

        // The same frame against a flat plane sees the slope as height.
        let flat = HeightGridBuilder::default().build(
            &frame.view(),
            &frame.view().full_roi(),
            &PlaneModel::flat(1000),
        );
        assert!(flat.occupied_cells() > 1);
    }

    #[test]
    fn roi_outside_frame_gives_empty_grid() {
        let frame = DepthFrame::filled(20, 20, 1000).unwrap();
        let grid = HeightGridBuilder::default().build(
            &frame.view(),
            &RegionOfInterest::new(50, 50, 10, 10),
            &PlaneModel::flat(1000),
        );
        assert!(grid.cells.is_empty());
        assert_eq!(grid.max_height_mm(), 0);
    }
}
