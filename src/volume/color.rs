use nalgebra::Vector3;
use ndarray::Array3;
use rayon::prelude::*;

use crate::camera::Intr;
use crate::pose::Pose;
use crate::utils::access::get_vec3;

/// One voxel of the color grid: RGB plus the running blend weight.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorVoxel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub weight: u8,
}

/// Dense RGB grid sharing the TSDF volume's metric cube, fed by the model
/// predicted vertex map after each successfully tracked frame.
pub struct ColorVolume {
    voxels: Vec<ColorVoxel>,
    resolution: (usize, usize, usize),
    size: Vector3<f32>,
    max_weight: u8,
}

impl ColorVolume {
    pub fn new(resolution: (usize, usize, usize), size: Vector3<f32>, max_weight: u8) -> Self {
        Self {
            voxels: vec![ColorVoxel::default(); resolution.0 * resolution.1 * resolution.2],
            resolution,
            size,
            max_weight,
        }
    }

    pub fn clear(&mut self) {
        self.voxels
            .par_iter_mut()
            .for_each(|voxel| *voxel = ColorVoxel::default());
    }

    pub fn max_weight(&self) -> u8 {
        self.max_weight
    }

    pub fn set_size(&mut self, size: Vector3<f32>) {
        self.size = size;
    }

    fn cell_size(&self) -> Vector3<f32> {
        Vector3::new(
            self.size.x / self.resolution.0 as f32,
            self.size.y / self.resolution.1 as f32,
            self.size.z / self.resolution.2 as f32,
        )
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.resolution.1 + y) * self.resolution.0 + x
    }

    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> ColorVoxel {
        self.voxels[self.index(x, y, z)]
    }

    /// Voxel containing the metric point, or `None` outside the grid.
    pub fn voxel_of_point(&self, point: &Vector3<f32>) -> Option<(usize, usize, usize)> {
        let cell = self.cell_size();
        let x = (point.x / cell.x).floor();
        let y = (point.y / cell.y).floor();
        let z = (point.z / cell.z).floor();
        if x < 0.0
            || y < 0.0
            || z < 0.0
            || x >= self.resolution.0 as f32
            || y >= self.resolution.1 as f32
            || z >= self.resolution.2 as f32
        {
            return None;
        }
        Some((x as usize, y as usize, z as usize))
    }

    /// Blends the colors seen by the current frame into the voxels nearest
    /// to the predicted surface.
    ///
    /// `vmap` is the world-frame predicted vertex map rendered at `pose`;
    /// `colors` is the RGB(A) frame, whose first three channels are read.
    ///
    /// Several pixels can land in the same voxel, so the work is split over
    /// Z-slices of the grid: every slice scans the vertex map and applies
    /// only the writes that fall into its own layer, which keeps each voxel
    /// owned by exactly one worker.
    pub fn update(&mut self, vmap: &Array3<f32>, colors: &Array3<u8>, intr: &Intr, pose: &Pose) {
        let (rows, cols, _) = vmap.dim();
        let (res_x, res_y, res_z) = self.resolution;
        let cell = self.cell_size();
        let max_weight = self.max_weight;
        let pose_inv = pose.inverse();
        let vmap_view = vmap.view();

        let voxel_of = |point: &Vector3<f32>| -> Option<(usize, usize, usize)> {
            let x = (point.x / cell.x).floor();
            let y = (point.y / cell.y).floor();
            let z = (point.z / cell.z).floor();
            if x < 0.0
                || y < 0.0
                || z < 0.0
                || x >= res_x as f32
                || y >= res_y as f32
                || z >= res_z as f32
            {
                return None;
            }
            Some((x as usize, y as usize, z as usize))
        };

        self.voxels
            .par_chunks_mut(res_x * res_y)
            .enumerate()
            .for_each(|(slice_z, slice)| {
                for y in 0..rows {
                    for x in 0..cols {
                        let vertex = get_vec3(&vmap_view, y, x);
                        if vertex.x.is_nan() {
                            continue;
                        }
                        let Some((vx, vy, vz)) = voxel_of(&vertex) else {
                            continue;
                        };
                        if vz != slice_z {
                            continue;
                        }

                        let camera = pose_inv.transform_point(&vertex);
                        if camera.z <= 0.0 {
                            continue;
                        }
                        let (u, v) = intr.project(&camera);
                        let (u, v) = (u.round() as i32, v.round() as i32);
                        if u < 0 || v < 0 || u >= cols as i32 || v >= rows as i32 {
                            continue;
                        }
                        let sample = (
                            colors[(v as usize, u as usize, 0)],
                            colors[(v as usize, u as usize, 1)],
                            colors[(v as usize, u as usize, 2)],
                        );

                        let voxel = &mut slice[vy * res_x + vx];
                        let weight = voxel.weight as u16;
                        let blend = |old: u8, new: u8| -> u8 {
                            ((old as u16 * weight + new as u16) / (weight + 1)) as u8
                        };
                        *voxel = ColorVoxel {
                            r: blend(voxel.r, sample.0),
                            g: blend(voxel.g, sample.1),
                            b: blend(voxel.b, sample.2),
                            weight: (voxel.weight + 1).min(max_weight),
                        };
                    }
                }
            });
    }

    /// Trilinearly interpolated color at a metric point, or `None` when the
    /// stencil leaves the grid or no neighbor has been observed.
    pub fn interpolate(&self, point: &Vector3<f32>) -> Option<Vector3<u8>> {
        let cell = self.cell_size();
        let gx = point.x / cell.x - 0.5;
        let gy = point.y / cell.y - 0.5;
        let gz = point.z / cell.z - 0.5;
        if gx < 0.0 || gy < 0.0 || gz < 0.0 {
            return None;
        }

        let (x0, y0, z0) = (gx as usize, gy as usize, gz as usize);
        if x0 + 1 >= self.resolution.0 || y0 + 1 >= self.resolution.1 || z0 + 1 >= self.resolution.2
        {
            return None;
        }
        let (ax, ay, az) = (gx - x0 as f32, gy - y0 as f32, gz - z0 as f32);

        let mut accum = Vector3::<f32>::zeros();
        let mut weight_sum = 0.0f32;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let voxel = self.voxel(x0 + dx, y0 + dy, z0 + dz);
                    if voxel.weight == 0 {
                        continue;
                    }
                    let weight = (if dx == 0 { 1.0 - ax } else { ax })
                        * (if dy == 0 { 1.0 - ay } else { ay })
                        * (if dz == 0 { 1.0 - az } else { az });
                    accum += Vector3::new(voxel.r as f32, voxel.g as f32, voxel.b as f32) * weight;
                    weight_sum += weight;
                }
            }
        }

        if weight_sum <= 0.0 {
            return None;
        }
        accum /= weight_sum;
        Some(Vector3::new(
            accum.x.round() as u8,
            accum.y.round() as u8,
            accum.z.round() as u8,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_test::test_intr;
    use nalgebra::Matrix3;
    use ndarray::Array3;

    #[test]
    fn repeated_updates_converge_to_the_observed_color() {
        let mut volume = ColorVolume::new((32, 32, 32), Vector3::new(3.0, 3.0, 3.0), 64);
        let pose = Pose::new(Matrix3::identity(), Vector3::new(1.5, 1.5, -0.1));
        let intr = test_intr();

        // predicted vertices on a wall at world z = 1.4
        let (rows, cols) = (96, 128);
        let mut vmap = Array3::<f32>::zeros((rows, cols, 3));
        for y in 0..rows {
            for x in 0..cols {
                let point = pose.transform_point(&intr.backproject(x as f32, y as f32, 1.5));
                vmap[(y, x, 0)] = point.x;
                vmap[(y, x, 1)] = point.y;
                vmap[(y, x, 2)] = point.z;
            }
        }

        let mut colors = Array3::<u8>::zeros((rows, cols, 3));
        colors.slice_mut(ndarray::s![.., .., 0]).fill(255);

        for _ in 0..70 {
            volume.update(&vmap, &colors, &intr, &pose);
        }

        let (vx, vy, vz) = volume
            .voxel_of_point(&Vector3::new(1.5, 1.5, 1.4))
            .unwrap();
        let voxel = volume.voxel(vx, vy, vz);
        assert_eq!((voxel.r, voxel.g, voxel.b), (255, 0, 0));
        assert_eq!(voxel.weight, 64);
    }

    #[test]
    fn interpolation_requires_an_observation() {
        let volume = ColorVolume::new((16, 16, 16), Vector3::new(1.6, 1.6, 1.6), 8);
        assert!(volume.interpolate(&Vector3::new(0.8, 0.8, 0.8)).is_none());
    }
}
