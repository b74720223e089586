use nalgebra::Vector3;
use ndarray::Array1;
use rayon::prelude::*;

use crate::pointcloud::PointCloud;
use crate::volume::{ColorVolume, TsdfVolume};

/// Neighborhood inspected for zero crossings during surface extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// Axis-aligned forward neighbors only.
    Six,
    /// The 13 unique forward neighbors of the 26-neighborhood.
    TwentySix,
}

const FORWARD_6: [(i32, i32, i32); 3] = [(1, 0, 0), (0, 1, 0), (0, 0, 1)];

const FORWARD_26: [(i32, i32, i32); 13] = [
    (-1, 0, 0),
    (-1, 1, 0),
    (0, 1, 0),
    (1, 1, 0),
    (-1, -1, 1),
    (0, -1, 1),
    (1, -1, 1),
    (-1, 0, 1),
    (0, 0, 1),
    (1, 0, 1),
    (-1, 1, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// Enumerates the zero crossings of the TSDF as a point cloud.
///
/// For every observed cell, each forward neighbor with an opposite TSDF sign
/// contributes one point, linearly interpolated between the two cell centers
/// by the magnitude of the two values. Unobserved cells never participate.
pub fn extract_points(volume: &TsdfVolume, connectivity: Connectivity) -> PointCloud {
    let (res_x, res_y, res_z) = volume.resolution();
    let neighbors: &[(i32, i32, i32)] = match connectivity {
        Connectivity::Six => &FORWARD_6,
        Connectivity::TwentySix => &FORWARD_26,
    };

    let points: Vec<Vector3<f32>> = (1..res_x - 1)
        .into_par_iter()
        .flat_map_iter(|x| {
            let mut slab = Vec::new();
            for y in 1..res_y - 1 {
                for z in 0..res_z - 1 {
                    let voxel = volume.voxel(x, y, z);
                    if !voxel.is_observed() {
                        continue;
                    }
                    let f = voxel.tsdf as f32;
                    let center = volume.voxel_center(x, y, z);

                    for &(dx, dy, dz) in neighbors {
                        let (nx, ny, nz) = (
                            (x as i32 + dx) as usize,
                            (y as i32 + dy) as usize,
                            (z as i32 + dz) as usize,
                        );
                        if nx >= res_x || ny >= res_y || nz >= res_z {
                            continue;
                        }
                        let neighbor = volume.voxel(nx, ny, nz);
                        if !neighbor.is_observed() {
                            continue;
                        }
                        let fn_ = neighbor.tsdf as f32;
                        if (f > 0.0) == (fn_ > 0.0) || f == 0.0 || fn_ == 0.0 {
                            continue;
                        }

                        let neighbor_center = volume.voxel_center(nx, ny, nz);
                        let point = (center * fn_.abs() + neighbor_center * f.abs())
                            / (f.abs() + fn_.abs());
                        slab.push(point);
                    }
                }
            }
            slab
        })
        .collect();

    PointCloud::from_points(Array1::from_vec(points))
}

/// TSDF-gradient normals at the given surface points, NaN where the gradient
/// stencil is unobserved.
pub fn extract_normals(volume: &TsdfVolume, cloud: &PointCloud) -> Array1<Vector3<f32>> {
    let cell = volume.cell_size();
    let normals: Vec<Vector3<f32>> = cloud
        .points
        .as_slice()
        .expect("contiguous points")
        .par_iter()
        .map(|point| {
            let mut gradient = Vector3::zeros();
            for axis in 0..3 {
                let mut forward = *point;
                let mut backward = *point;
                forward[axis] += cell[axis];
                backward[axis] -= cell[axis];
                match (volume.interpolate(&forward), volume.interpolate(&backward)) {
                    (Some(f), Some(b)) => gradient[axis] = (f - b) / (2.0 * cell[axis]),
                    _ => return Vector3::from_element(f32::NAN),
                }
            }
            let magnitude = gradient.norm();
            if magnitude > 1e-6 {
                gradient / magnitude
            } else {
                Vector3::from_element(f32::NAN)
            }
        })
        .collect();

    Array1::from_vec(normals)
}

/// Colors at the given surface points, looked up by trilinear interpolation
/// in the color volume. Points without any observed color neighbor come out
/// black.
pub fn extract_colors(colors: &ColorVolume, cloud: &PointCloud) -> Array1<Vector3<u8>> {
    let values: Vec<Vector3<u8>> = cloud
        .points
        .as_slice()
        .expect("contiguous points")
        .par_iter()
        .map(|point| colors.interpolate(point).unwrap_or_else(Vector3::zeros))
        .collect();

    Array1::from_vec(values)
}
