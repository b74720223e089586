use ndarray::{Array2, Zip};
use num::clamp;

/// Edge-preserving bilateral filter for 16-bit depth maps.
///
/// Weights combine a spatial Gaussian over the window and a range Gaussian
/// over the depth difference to the center pixel, so that depth edges are
/// kept sharp. Invalid (zero) pixels stay invalid and never contribute to
/// their neighbors.
#[derive(Debug, Clone)]
pub struct BilateralFilter {
    /// The space (XY) standard deviation, in pixels.
    pub sigma_space: f32,
    /// The range standard deviation, in depth units (mm).
    pub sigma_color: f32,
}

const WINDOW_RADIUS: i32 = 6;

impl Default for BilateralFilter {
    fn default() -> Self {
        BilateralFilter {
            sigma_space: 4.5,
            sigma_color: 30.0,
        }
    }
}

impl BilateralFilter {
    pub fn new(sigma_space: f32, sigma_color: f32) -> Self {
        Self {
            sigma_space,
            sigma_color,
        }
    }

    /// Filters `depth` into `filtered`. Both maps must have the same shape.
    pub fn filter(&self, depth: &Array2<u16>, filtered: &mut Array2<u16>) {
        let (rows, cols) = depth.dim();
        let sigma_space2_inv_half = 0.5 / (self.sigma_space * self.sigma_space);
        let sigma_color2_inv_half = 0.5 / (self.sigma_color * self.sigma_color);

        Zip::indexed(filtered).par_for_each(|(y, x), out| {
            let value = depth[(y, x)];
            if value == 0 {
                *out = 0;
                return;
            }

            let y_start = (y as i32 - WINDOW_RADIUS).max(0) as usize;
            let y_end = (y as i32 + WINDOW_RADIUS + 1).min(rows as i32) as usize;
            let x_start = (x as i32 - WINDOW_RADIUS).max(0) as usize;
            let x_end = (x as i32 + WINDOW_RADIUS + 1).min(cols as i32) as usize;

            let mut sum1 = 0.0f32;
            let mut sum2 = 0.0f32;
            for cy in y_start..y_end {
                for cx in x_start..x_end {
                    let neighbor = depth[(cy, cx)];
                    if neighbor == 0 {
                        continue;
                    }

                    let dy = cy as f32 - y as f32;
                    let dx = cx as f32 - x as f32;
                    let space2 = dx * dx + dy * dy;
                    let diff = neighbor as f32 - value as f32;
                    let weight = (-(space2 * sigma_space2_inv_half
                        + diff * diff * sigma_color2_inv_half))
                        .exp();

                    sum1 += neighbor as f32 * weight;
                    sum2 += weight;
                }
            }

            let result = (sum1 / sum2).round();
            *out = clamp(result, 0.0, i16::MAX as f32) as u16;
        });
    }
}
