use nalgebra::{SymmetricEigen, Vector3};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, Axis};

use crate::camera::Intr;
use crate::pose::Pose;
use crate::utils::access::{get_vec3, put_vec3};

/// Millimeters to meters.
const DEPTH_SCALE: f32 = 0.001;

/// Unprojects a depth map into a camera-frame vertex map.
///
/// Invalid depth pixels produce NaN vertices.
pub fn create_vertex_map(intr: &Intr, depth: &Array2<u16>, vmap: &mut Array3<f32>) {
    vmap.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..row.shape()[0] {
                let d = depth[(y, x)];
                let vertex = if d > 0 {
                    intr.backproject(x as f32, y as f32, d as f32 * DEPTH_SCALE)
                } else {
                    Vector3::from_element(f32::NAN)
                };
                row[(x, 0)] = vertex.x;
                row[(x, 1)] = vertex.y;
                row[(x, 2)] = vertex.z;
            }
        });
}

const NORMAL_WINDOW_RADIUS: i32 = 2;
const NORMAL_MIN_POINTS: usize = 12;

/// Estimates per-pixel normals by fitting a plane to the valid vertices in a
/// 5x5 neighborhood. The smallest-eigenvalue direction of the local
/// covariance is the normal, oriented toward the camera.
///
/// Border pixels and neighborhoods with too few valid vertices produce NaN.
pub fn compute_normals(vmap: &Array3<f32>, nmap: &mut Array3<f32>) {
    let (rows, cols, _) = vmap.dim();
    let vmap_view = vmap.view();

    nmap.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..cols {
                let mut normal = Vector3::from_element(f32::NAN);

                if y > 0 && y < rows - 1 && x > 0 && x < cols - 1 {
                    let center = get_vec3(&vmap_view, y, x);
                    if !center.x.is_nan() {
                        if let Some(fitted) = fit_plane_normal(&vmap_view, y, x, rows, cols) {
                            // orient toward the camera origin
                            normal = if fitted.dot(&center) > 0.0 {
                                -fitted
                            } else {
                                fitted
                            };
                        }
                    }
                }

                row[(x, 0)] = normal.x;
                row[(x, 1)] = normal.y;
                row[(x, 2)] = normal.z;
            }
        });
}

fn fit_plane_normal(
    vmap: &ndarray::ArrayView3<f32>,
    y: usize,
    x: usize,
    rows: usize,
    cols: usize,
) -> Option<Vector3<f32>> {
    let y_start = (y as i32 - NORMAL_WINDOW_RADIUS).max(0) as usize;
    let y_end = (y as i32 + NORMAL_WINDOW_RADIUS + 1).min(rows as i32) as usize;
    let x_start = (x as i32 - NORMAL_WINDOW_RADIUS).max(0) as usize;
    let x_end = (x as i32 + NORMAL_WINDOW_RADIUS + 1).min(cols as i32) as usize;

    let mut centroid = Vector3::zeros();
    let mut count = 0usize;
    for cy in y_start..y_end {
        for cx in x_start..x_end {
            let point = get_vec3(vmap, cy, cx);
            if point.x.is_nan() {
                continue;
            }
            centroid += point;
            count += 1;
        }
    }

    if count < NORMAL_MIN_POINTS {
        return None;
    }
    centroid /= count as f32;

    let mut covariance = nalgebra::Matrix3::<f32>::zeros();
    for cy in y_start..y_end {
        for cx in x_start..x_end {
            let point = get_vec3(vmap, cy, cx);
            if point.x.is_nan() {
                continue;
            }
            let diff = point - centroid;
            covariance += diff * diff.transpose();
        }
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut min_index = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_index] {
            min_index = i;
        }
    }

    let normal = eigen.eigenvectors.column(min_index).into_owned();
    let magnitude = normal.norm();
    if magnitude > 1e-6 {
        Some(normal / magnitude)
    } else {
        None
    }
}

/// Maps a camera-frame vertex/normal pair into the world frame.
pub fn transform_maps(
    vmap: &Array3<f32>,
    nmap: &Array3<f32>,
    pose: &Pose,
    vmap_out: &mut Array3<f32>,
    nmap_out: &mut Array3<f32>,
) {
    let cols = vmap.dim().1;
    let vmap_view = vmap.view();
    let nmap_view = nmap.view();

    vmap_out
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(nmap_out.axis_iter_mut(Axis(0)).into_par_iter())
        .enumerate()
        .for_each(|(y, (mut vrow, mut nrow))| {
            for x in 0..cols {
                let vertex = get_vec3(&vmap_view, y, x);
                let normal = get_vec3(&nmap_view, y, x);
                let (vertex, normal) = if vertex.x.is_nan() {
                    (
                        Vector3::from_element(f32::NAN),
                        Vector3::from_element(f32::NAN),
                    )
                } else {
                    (pose.transform_point(&vertex), pose.rotate_vector(&normal))
                };
                for lane in 0..3 {
                    vrow[(x, lane)] = vertex[lane];
                    nrow[(x, lane)] = normal[lane];
                }
            }
        });
}
