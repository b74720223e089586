use log::warn;
use nalgebra::{Rotation3, Vector3};
use ndarray::Array3;

use crate::camera::Intr;
use crate::frame::{FramePyramid, LEVELS};
use crate::pose::Pose;

use super::{accumulate_step, IcpParams};

/// Frame-to-model ICP: aligns the current frame pyramid to the model
/// prediction rendered for the previous frame.
pub struct FrameToModelIcp<'params> {
    params: &'params IcpParams,
    intr: Intr,
}

impl<'params> FrameToModelIcp<'params> {
    pub fn new(params: &'params IcpParams, intr: Intr) -> Self {
        Self { params, intr }
    }

    /// Estimates the camera pose of the current frame.
    ///
    /// Runs coarse-to-fine over the pyramid, starting from the previous
    /// pose. Every iteration solves the linearized point-to-plane system and
    /// composes the Euler increment `Rz(gamma) * Ry(beta) * Rx(alpha)` onto
    /// the candidate.
    ///
    /// # Returns
    ///
    /// * `Some(pose)` with the estimated camera-to-world pose.
    /// * `None` when the linear system is singular or non-finite; the caller
    ///   is expected to reset the session and drop the frame.
    pub fn align(
        &self,
        current: &FramePyramid,
        vmaps_prev: &[Array3<f32>],
        nmaps_prev: &[Array3<f32>],
        prev_pose: &Pose,
    ) -> Option<Pose> {
        let prev_pose_inv = prev_pose.inverse();
        let mut rotation = prev_pose.rotation;
        let mut translation = prev_pose.translation;

        for level in (0..LEVELS).rev() {
            let level_intr = self.intr.level(level);
            for _ in 0..self.params.iterations[level] {
                let neq = accumulate_step(
                    &rotation,
                    &translation,
                    &current.vmaps[level],
                    &current.nmaps[level],
                    &prev_pose_inv,
                    &level_intr,
                    &vmaps_prev[level],
                    &nmaps_prev[level],
                    self.params.dist_threshold,
                    self.params.angle_threshold,
                );

                let update = match neq.solve() {
                    Some(update) => update,
                    None => {
                        warn!("singular or non-finite point-to-plane system, tracking lost");
                        return None;
                    }
                };

                let r_inc =
                    Rotation3::from_euler_angles(update[0], update[1], update[2]).into_inner();
                let t_inc = Vector3::new(update[3], update[4], update[5]);

                translation = r_inc * translation + t_inc;
                rotation = r_inc * rotation;
            }
        }

        Some(Pose::new(rotation, translation))
    }
}
