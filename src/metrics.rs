use crate::pose::Pose;

/// Difference between two poses.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseDelta {
    /// Rotation angle between the two poses, in radians.
    pub angle: f32,
    /// Translation vector length between the two poses, in meters.
    pub translation: f32,
}

impl PoseDelta {
    /// Creates a new `PoseDelta` from two poses.
    pub fn new(lfs: &Pose, rhs: &Pose) -> Self {
        let diff = &lfs.inverse() * rhs;
        Self {
            angle: diff.angle(),
            translation: diff.translation.norm(),
        }
    }
}
