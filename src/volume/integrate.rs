use nalgebra::Vector3;
use ndarray::Array2;
use rayon::prelude::*;

use crate::camera::Intr;
use crate::pose::Pose;

use super::tsdf::{TsdfVolume, TsdfVoxel, MAX_WEIGHT};

/// Millimeters to meters.
const DEPTH_SCALE: f32 = 0.001;

impl TsdfVolume {
    /// Fuses one raw depth frame into the grid.
    ///
    /// Every voxel is projected into the depth image; the signed distance
    /// between the observed surface and the voxel is measured along the
    /// viewing ray, truncated, and folded into the running average under the
    /// capped weight. Voxels behind the camera, outside the image, without a
    /// depth sample, or deeper than one truncation band behind the surface
    /// are left untouched.
    pub fn integrate(&mut self, depth: &Array2<u16>, intr: &Intr, pose: &Pose) {
        let (rows, cols) = depth.dim();
        let (res_x, res_y, _) = self.resolution();
        let cell = self.cell_size();
        let tranc_dist = self.truncation_distance();
        let pose_inv = pose.inverse();

        self.voxels_mut()
            .par_chunks_mut(res_x * res_y)
            .enumerate()
            .for_each(|(z, slice)| {
                let pz = (z as f32 + 0.5) * cell.z;
                for y in 0..res_y {
                    let py = (y as f32 + 0.5) * cell.y;
                    for x in 0..res_x {
                        let world = Vector3::new((x as f32 + 0.5) * cell.x, py, pz);
                        let camera = pose_inv.transform_point(&world);
                        if camera.z <= 0.0 {
                            continue;
                        }

                        let (u, v) = intr.project(&camera);
                        let (u, v) = (u.round() as i32, v.round() as i32);
                        if u < 0 || v < 0 || u >= cols as i32 || v >= rows as i32 {
                            continue;
                        }

                        let d = depth[(v as usize, u as usize)] as f32 * DEPTH_SCALE;
                        if d <= 0.0 {
                            continue;
                        }

                        // signed distance along the pixel ray
                        let lambda = intr.ray_direction(u as f32, v as f32).norm();
                        let sdf = d * lambda - camera.norm();
                        if sdf < -tranc_dist {
                            continue;
                        }

                        let tsdf_new = (sdf / tranc_dist).min(1.0).max(-1.0);

                        let voxel = &mut slice[y * res_x + x];
                        let weight_old = voxel.weight;
                        let value =
                            (voxel.value() * weight_old as f32 + tsdf_new) / (weight_old + 1) as f32;
                        *voxel = TsdfVoxel::pack(value, (weight_old + 1).min(MAX_WEIGHT));
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_test::{test_intr, wall_depth};
    use nalgebra::Matrix3;

    const ROWS: usize = 96;
    const COLS: usize = 128;

    fn volume_and_pose() -> (TsdfVolume, Pose) {
        let volume = TsdfVolume::new((64, 64, 64), Vector3::new(3.0, 3.0, 3.0), 0.1);
        // camera slightly outside the volume, looking along +Z through it
        let pose = Pose::new(Matrix3::identity(), Vector3::new(1.5, 1.5, -0.1));
        (volume, pose)
    }

    #[test]
    fn wall_observation_creates_a_signed_slab() {
        let (mut volume, pose) = volume_and_pose();
        let depth = wall_depth(ROWS, COLS, 1500);
        volume.integrate(&depth, &test_intr(), &pose);

        // the wall sits at world z = 1.4; in front of it the TSDF is
        // positive, behind it negative, and every observed value is in range
        let (x, y) = (32, 32);
        let mut saw_positive = false;
        let mut saw_negative = false;
        for z in 0..64 {
            let voxel = volume.voxel(x, y, z);
            if !voxel.is_observed() {
                continue;
            }
            let value = voxel.value();
            assert!((-1.0..=1.0).contains(&value));
            assert!(voxel.weight >= 1 && voxel.weight <= MAX_WEIGHT);
            let center_z = volume.voxel_center(x, y, z).z;
            if center_z < 1.35 {
                saw_positive = true;
                assert!(value > 0.0, "z {} value {}", center_z, value);
            }
            if center_z > 1.45 && value < 0.9 {
                saw_negative = true;
            }
        }
        assert!(saw_positive);
        assert!(saw_negative);
    }

    #[test]
    fn weights_grow_monotonically_up_to_the_cap() {
        let (mut volume, pose) = volume_and_pose();
        let depth = wall_depth(ROWS, COLS, 1500);

        volume.integrate(&depth, &test_intr(), &pose);
        let w1 = volume.voxel(32, 32, 29).weight;
        volume.integrate(&depth, &test_intr(), &pose);
        let w2 = volume.voxel(32, 32, 29).weight;

        assert!(w1 >= 1);
        assert_eq!(w2, w1 + 1);

        for _ in 0..(MAX_WEIGHT + 10) {
            volume.integrate(&depth, &test_intr(), &pose);
        }
        assert_eq!(volume.voxel(32, 32, 29).weight, MAX_WEIGHT);
    }

    #[test]
    fn far_behind_the_surface_is_untouched() {
        let (mut volume, pose) = volume_and_pose();
        let depth = wall_depth(ROWS, COLS, 1000);
        volume.integrate(&depth, &test_intr(), &pose);

        // wall at world z = 0.9; a voxel a long way behind it must stay
        // unobserved
        let (x, y, z) = (32, 32, 40);
        assert!(volume.voxel_center(x, y, z).z > 0.9 + volume.truncation_distance());
        assert_eq!(volume.voxel(x, y, z), TsdfVoxel::UNOBSERVED);
    }

    #[test]
    fn invalid_depth_never_integrates() {
        let (mut volume, pose) = volume_and_pose();
        let depth = wall_depth(ROWS, COLS, 0);
        volume.integrate(&depth, &test_intr(), &pose);
        assert!((0..64).all(|z| !volume.voxel(32, 32, z).is_observed()));
    }
}
