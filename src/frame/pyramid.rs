use ndarray::{Array2, Array3, Zip};

use crate::bilateral::BilateralFilter;
use crate::camera::Intr;

use super::{compute_normals, create_vertex_map};

/// Number of pyramid levels, full resolution first.
pub const LEVELS: usize = 3;

/// Range-aware threshold for the 2x depth decimation, in millimeters.
/// Neighbors farther than this from the window center are left out so that
/// depth edges do not bleed across levels.
const PYR_DOWN_DEPTH_DIFF: i32 = 90;
const PYR_DOWN_RADIUS: i32 = 2;

/// Invalidates every pixel beyond `max_distance` (meters).
pub fn truncate_depth(depth: &mut Array2<u16>, max_distance: f32) {
    let limit = (max_distance * 1000.0) as u16;
    depth.par_mapv_inplace(|d| if d > limit { 0 } else { d });
}

/// Decimates `src` by 2x with a range-aware window average.
pub fn pyr_down(src: &Array2<u16>, dst: &mut Array2<u16>) {
    let (src_rows, src_cols) = src.dim();

    Zip::indexed(dst).par_for_each(|(y, x), out| {
        let center = src[(y * 2, x * 2)];
        if center == 0 {
            *out = 0;
            return;
        }

        let y_start = (y as i32 * 2 - PYR_DOWN_RADIUS).max(0) as usize;
        let y_end = (y as i32 * 2 + PYR_DOWN_RADIUS + 1).min(src_rows as i32) as usize;
        let x_start = (x as i32 * 2 - PYR_DOWN_RADIUS).max(0) as usize;
        let x_end = (x as i32 * 2 + PYR_DOWN_RADIUS + 1).min(src_cols as i32) as usize;

        let mut sum = 0i32;
        let mut count = 0i32;
        for cy in y_start..y_end {
            for cx in x_start..x_end {
                let value = src[(cy, cx)];
                if value == 0 {
                    continue;
                }
                if (value as i32 - center as i32).abs() >= PYR_DOWN_DEPTH_DIFF {
                    continue;
                }
                sum += value as i32;
                count += 1;
            }
        }

        *out = (sum / count) as u16;
    });
}

/// Per-frame multi-resolution depth, vertex and normal maps.
///
/// All buffers are allocated once from the full-resolution shape and reused
/// for every frame.
pub struct FramePyramid {
    pub depths: Vec<Array2<u16>>,
    pub vmaps: Vec<Array3<f32>>,
    pub nmaps: Vec<Array3<f32>>,
}

impl FramePyramid {
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut depths = Vec::with_capacity(LEVELS);
        let mut vmaps = Vec::with_capacity(LEVELS);
        let mut nmaps = Vec::with_capacity(LEVELS);
        for level in 0..LEVELS {
            let (r, c) = (rows >> level, cols >> level);
            depths.push(Array2::zeros((r, c)));
            vmaps.push(Array3::zeros((r, c, 3)));
            nmaps.push(Array3::zeros((r, c, 3)));
        }
        Self {
            depths,
            vmaps,
            nmaps,
        }
    }

    /// Runs the whole preprocessing stage: bilateral filtering, optional
    /// depth truncation for the tracker, 2x decimation and per-level
    /// vertex/normal map creation.
    ///
    /// The raw depth handed to volume integration is left untouched; only
    /// the filtered copy is truncated.
    pub fn process(
        &mut self,
        depth_raw: &Array2<u16>,
        intr: &Intr,
        filter: &BilateralFilter,
        max_icp_distance: f32,
    ) {
        filter.filter(depth_raw, &mut self.depths[0]);
        if max_icp_distance > 0.0 {
            truncate_depth(&mut self.depths[0], max_icp_distance);
        }

        for level in 1..LEVELS {
            let (coarse, fine) = self.depths.split_at_mut(level);
            pyr_down(&coarse[level - 1], &mut fine[0]);
        }

        for level in 0..LEVELS {
            let level_intr = intr.level(level);
            create_vertex_map(&level_intr, &self.depths[level], &mut self.vmaps[level]);
            compute_normals(&self.vmaps[level], &mut self.nmaps[level]);
        }
    }
}
