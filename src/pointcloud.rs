use nalgebra::Vector3;
use ndarray::Array1;

/// Surface samples extracted from the volume: points with optional normals
/// and colors.
pub struct PointCloud {
    pub points: Array1<Vector3<f32>>,
    pub normals: Option<Array1<Vector3<f32>>>,
    pub colors: Option<Array1<Vector3<u8>>>,
}

impl PointCloud {
    pub fn from_points(points: Array1<Vector3<f32>>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
