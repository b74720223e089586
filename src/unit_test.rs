//! Synthetic scenes shared by the crate's tests.

use nalgebra::Vector3;
use ndarray::Array2;

use crate::camera::Intr;
use crate::pose::Pose;

/// Intrinsics matching the 128x96 test frames.
pub fn test_intr() -> Intr {
    Intr::new(100.0, 100.0, 64.0, 48.0)
}

/// World Z of the rippled test surface.
pub const RIPPLE_Z0: f32 = 1.5;

/// Height of the rippled surface at world `(x, y)`. The ripples break the
/// gauge freedoms a single flat plane would leave to point-to-plane ICP.
pub fn ripple_height(x: f32, y: f32) -> f32 {
    RIPPLE_Z0 + 0.03 * (8.0 * x).sin() * (6.0 * y).cos()
}

/// Renders a depth map of the rippled surface as seen from `pose`.
///
/// Solved per pixel by fixed-point iteration on the ray/heightfield
/// intersection; the surface slope is shallow, so a handful of iterations
/// converge well below depth quantization.
pub fn ripple_depth_from_pose(pose: &Pose, intr: &Intr, rows: usize, cols: usize) -> Array2<u16> {
    let mut depth = Array2::<u16>::zeros((rows, cols));
    for y in 0..rows {
        for x in 0..cols {
            let dir = pose.rotate_vector(&intr.ray_direction(x as f32, y as f32));
            if dir.z.abs() < 1e-6 {
                continue;
            }

            let origin = pose.translation;
            let mut s = (RIPPLE_Z0 - origin.z) / dir.z;
            for _ in 0..15 {
                let px = origin.x + s * dir.x;
                let py = origin.y + s * dir.y;
                s = (ripple_height(px, py) - origin.z) / dir.z;
            }

            if s > 0.0 {
                depth[(y, x)] = (s * 1000.0).round() as u16;
            }
        }
    }
    depth
}

/// Constant-depth frame, `value` in millimeters.
pub fn wall_depth(rows: usize, cols: usize, value: u16) -> Array2<u16> {
    Array2::from_elem((rows, cols), value)
}

/// Renders a depth map of a sphere as seen from `pose`. Pixels that miss the
/// sphere stay invalid.
pub fn sphere_depth_from_pose(
    pose: &Pose,
    intr: &Intr,
    rows: usize,
    cols: usize,
    center: Vector3<f32>,
    radius: f32,
) -> Array2<u16> {
    let mut depth = Array2::<u16>::zeros((rows, cols));
    for y in 0..rows {
        for x in 0..cols {
            let dir = pose.rotate_vector(&intr.ray_direction(x as f32, y as f32));
            let oc = pose.translation - center;

            let a = dir.dot(&dir);
            let b = 2.0 * dir.dot(&oc);
            let c = oc.dot(&oc) - radius * radius;
            let disc = b * b - 4.0 * a * c;
            if disc < 0.0 {
                continue;
            }

            let s = (-b - disc.sqrt()) / (2.0 * a);
            if s > 0.0 {
                depth[(y, x)] = (s * 1000.0).round() as u16;
            }
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    #[test]
    fn ripple_depth_matches_the_heightfield_at_the_center() {
        let pose = Pose::new(Matrix3::identity(), Vector3::new(1.5, 1.5, 0.1));
        let depth = ripple_depth_from_pose(&pose, &test_intr(), 96, 128);

        // the central ray hits the surface straight above the camera
        let expected = ripple_height(1.5, 1.5) - 0.1;
        let center = depth[(48, 64)] as f32 * 0.001;
        assert!((center - expected).abs() < 2e-3);
    }

    #[test]
    fn sphere_depth_is_closest_at_the_center() {
        let center = Vector3::new(1.5, 1.5, 1.5);
        let pose = Pose::new(Matrix3::identity(), Vector3::new(1.5, 1.5, 0.0));
        let depth = sphere_depth_from_pose(&pose, &test_intr(), 96, 128, center, 0.5);

        assert_eq!(depth[(48, 64)], 1000);
        assert!(depth[(0, 0)] == 0);
        assert!(depth[(48, 80)] > 1000);
    }
}
