use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use rayon::prelude::*;

use crate::camera::Intr;
use crate::optim::NormalEquations;
use crate::pose::Pose;
use crate::utils::access::get_vec3;

/// Accumulates the point-to-plane normal equations for one ICP iteration.
///
/// Each pixel of the current vertex map is brought into the world frame with
/// the candidate `(rotation, translation)`, projectively associated with the
/// model prediction through the previous camera, filtered by distance and
/// normal agreement, and linearized around a small rotation increment
/// `(alpha, beta, gamma)` plus translation.
///
/// Rows are reduced in parallel; the returned accumulator is the final sum.
#[allow(clippy::too_many_arguments)]
pub fn accumulate_step(
    rotation: &Matrix3<f32>,
    translation: &Vector3<f32>,
    vmap_curr: &Array3<f32>,
    nmap_curr: &Array3<f32>,
    prev_pose_inv: &Pose,
    intr: &Intr,
    vmap_prev: &Array3<f32>,
    nmap_prev: &Array3<f32>,
    dist_threshold: f32,
    angle_threshold: f32,
) -> NormalEquations {
    let (rows, cols, _) = vmap_curr.dim();
    let (prev_rows, prev_cols, _) = vmap_prev.dim();
    let vmap_curr = vmap_curr.view();
    let nmap_curr = nmap_curr.view();
    let vmap_prev = vmap_prev.view();
    let nmap_prev = nmap_prev.view();

    (0..rows)
        .into_par_iter()
        .map(|y| {
            let mut neq = NormalEquations::zeros();
            for x in 0..cols {
                let ncurr = get_vec3(&nmap_curr, y, x);
                if ncurr.x.is_nan() {
                    continue;
                }
                let vcurr = get_vec3(&vmap_curr, y, x);
                if vcurr.x.is_nan() {
                    continue;
                }

                let vcurr_g = rotation * vcurr + translation;

                // projective association through the previous camera
                let vcurr_cp = prev_pose_inv.transform_point(&vcurr_g);
                if vcurr_cp.z <= 0.0 {
                    continue;
                }
                let (u, v) = intr.project(&vcurr_cp);
                let (u, v) = (u.round() as i32, v.round() as i32);
                if u < 0 || v < 0 || u >= prev_cols as i32 || v >= prev_rows as i32 {
                    continue;
                }

                let vprev_g = get_vec3(&vmap_prev, v as usize, u as usize);
                if vprev_g.x.is_nan() {
                    continue;
                }
                let nprev_g = get_vec3(&nmap_prev, v as usize, u as usize);
                if nprev_g.x.is_nan() {
                    continue;
                }

                if (vprev_g - vcurr_g).norm() > dist_threshold {
                    continue;
                }
                let ncurr_g = rotation * ncurr;
                if ncurr_g.cross(&nprev_g).norm() > angle_threshold {
                    continue;
                }

                let twist = vcurr_g.cross(&nprev_g);
                let row = [
                    twist.x, twist.y, twist.z, nprev_g.x, nprev_g.y, nprev_g.z,
                ];
                neq.add_row(&row, nprev_g.dot(&(vprev_g - vcurr_g)));
            }
            neq
        })
        .reduce(NormalEquations::zeros, |lfs, rhs| lfs.merge(&rhs))
}
