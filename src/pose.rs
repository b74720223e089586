use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use std::ops;

/// Rigid camera-to-world transform.
///
/// The rotation is stored as a plain 3x3 matrix, exactly as estimated, and is
/// never re-orthogonalized; small numerical drift accumulated over many
/// incremental updates is accepted.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Maps a point from the camera frame into the world frame.
    pub fn transform_point(&self, point: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * point + self.translation
    }

    /// Rotates a direction vector, ignoring the translation part.
    pub fn rotate_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * vector
    }

    pub fn inverse(&self) -> Self {
        let rotation_inv = self
            .rotation
            .try_inverse()
            .unwrap_or_else(|| self.rotation.transpose());
        Self {
            rotation: rotation_inv,
            translation: -(rotation_inv * self.translation),
        }
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f32 {
        let cos = (self.rotation.trace() - 1.0) * 0.5;
        cos.clamp(-1.0, 1.0).acos()
    }
}

impl ops::Mul<&Pose> for &Pose {
    type Output = Pose;

    fn mul(self, rhs: &Pose) -> Pose {
        Pose {
            rotation: self.rotation * rhs.rotation,
            translation: self.rotation * rhs.translation + self.translation,
        }
    }
}

impl From<Isometry3<f32>> for Pose {
    fn from(isometry: Isometry3<f32>) -> Self {
        Self {
            rotation: isometry.rotation.to_rotation_matrix().into_inner(),
            translation: isometry.translation.vector,
        }
    }
}

impl From<Pose> for Isometry3<f32> {
    fn from(pose: Pose) -> Self {
        Isometry3::from_parts(
            Translation3::from(pose.translation),
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&pose.rotation)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Pose;
    use nalgebra::{Matrix3, Rotation3, Vector3};

    #[test]
    fn compose_then_invert_is_identity() {
        let pose = Pose::new(
            Rotation3::from_euler_angles(0.1, -0.2, 0.3).into_inner(),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let identity = &pose * &pose.inverse();
        assert!((identity.rotation - Matrix3::identity()).norm() < 1e-5);
        assert!(identity.translation.norm() < 1e-5);
    }

    #[test]
    fn transform_point_applies_rotation_and_translation() {
        let pose = Pose::new(
            Rotation3::from_euler_angles(0.0, 0.0, std::f32::consts::FRAC_PI_2).into_inner(),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let mapped = pose.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((mapped - Vector3::new(0.0, 1.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn angle_of_identity_is_zero() {
        assert_eq!(Pose::identity().angle(), 0.0);
    }
}
