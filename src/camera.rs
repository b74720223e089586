use nalgebra::Vector3;

/// Pinhole intrinsic parameters of the depth camera.
#[derive(Clone, Copy, Debug)]
pub struct Intr {
    /// Focal length and pixel scale in the X-axis.
    pub fx: f32,
    /// Focal length and pixel scale in the Y-axis.
    pub fy: f32,
    /// Camera X-center.
    pub cx: f32,
    /// Camera Y-center.
    pub cy: f32,
}

impl Intr {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Intrinsics of pyramid level `level`, scaled by `2^-level`.
    pub fn level(&self, level: usize) -> Self {
        let div = (1 << level) as f32;
        Self {
            fx: self.fx / div,
            fy: self.fy / div,
            cx: self.cx / div,
            cy: self.cy / div,
        }
    }

    /// Project a 3D point in the camera frame into image space.
    ///
    /// # Arguments
    ///
    /// * point: The 3D point. The caller must ensure `point.z > 0`.
    ///
    /// # Returns
    ///
    /// * (x and y) pixel coordinates.
    pub fn project(&self, point: &Vector3<f32>) -> (f32, f32) {
        (
            point.x * self.fx / point.z + self.cx,
            point.y * self.fy / point.z + self.cy,
        )
    }

    /// Unproject pixel `(x, y)` at depth `z` into the camera frame.
    pub fn backproject(&self, x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new((x - self.cx) * z / self.fx, (y - self.cy) * z / self.fy, z)
    }

    /// Direction of the viewing ray through pixel `(x, y)`, unnormalized.
    pub fn ray_direction(&self, x: f32, y: f32) -> Vector3<f32> {
        Vector3::new((x - self.cx) / self.fx, (y - self.cy) / self.fy, 1.0)
    }
}
