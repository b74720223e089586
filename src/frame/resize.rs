use nalgebra::Vector3;
use ndarray::parallel::prelude::*;
use ndarray::{Array3, Axis};

use crate::utils::access::get_vec3;

fn resize_map(src: &Array3<f32>, dst: &mut Array3<f32>, normalize: bool) {
    let cols = dst.dim().1;
    let src_view = src.view();

    dst.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..cols {
                let x00 = get_vec3(&src_view, y * 2, x * 2);
                let x01 = get_vec3(&src_view, y * 2, x * 2 + 1);
                let x10 = get_vec3(&src_view, y * 2 + 1, x * 2);
                let x11 = get_vec3(&src_view, y * 2 + 1, x * 2 + 1);

                let mut value = Vector3::from_element(f32::NAN);
                if !x00.x.is_nan() && !x01.x.is_nan() && !x10.x.is_nan() && !x11.x.is_nan() {
                    let mean = (x00 + x01 + x10 + x11) * 0.25;
                    value = if normalize {
                        let magnitude = mean.norm();
                        if magnitude > 1e-6 {
                            mean / magnitude
                        } else {
                            Vector3::from_element(f32::NAN)
                        }
                    } else {
                        mean
                    };
                }

                row[(x, 0)] = value.x;
                row[(x, 1)] = value.y;
                row[(x, 2)] = value.z;
            }
        });
}

/// 2x box downsample of a vertex map; a destination pixel is valid only when
/// all four source pixels are.
pub fn resize_vmap(src: &Array3<f32>, dst: &mut Array3<f32>) {
    resize_map(src, dst, false);
}

/// 2x box downsample of a normal map, renormalized after averaging.
pub fn resize_nmap(src: &Array3<f32>, dst: &mut Array3<f32>) {
    resize_map(src, dst, true);
}
