use nalgebra::Vector3;
use ndarray::{Array3, ArrayView3, ArrayViewMut3};

/// Reads the 3-vector stored at pixel `(row, col)` of a vertex or normal map.
#[inline]
pub fn get_vec3(map: &ArrayView3<f32>, row: usize, col: usize) -> Vector3<f32> {
    Vector3::new(
        map[(row, col, 0)],
        map[(row, col, 1)],
        map[(row, col, 2)],
    )
}

#[inline]
pub fn put_vec3(map: &mut ArrayViewMut3<f32>, row: usize, col: usize, value: Vector3<f32>) {
    map[(row, col, 0)] = value.x;
    map[(row, col, 1)] = value.y;
    map[(row, col, 2)] = value.z;
}

/// A pixel is valid when no lane is NaN; NaN is the invalid-pixel sentinel.
#[inline]
pub fn is_valid(map: &ArrayView3<f32>, row: usize, col: usize) -> bool {
    !map[(row, col, 0)].is_nan()
}

/// Overwrites every pixel of the map with the NaN sentinel.
pub fn fill_invalid(map: &mut Array3<f32>) {
    map.fill(f32::NAN);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn roundtrip_and_validity() {
        let mut map = Array3::<f32>::zeros((2, 2, 3));
        fill_invalid(&mut map);
        assert!(!is_valid(&map.view(), 0, 0));

        put_vec3(&mut map.view_mut(), 1, 1, Vector3::new(1.0, 2.0, 3.0));
        assert!(is_valid(&map.view(), 1, 1));
        assert_eq!(get_vec3(&map.view(), 1, 1), Vector3::new(1.0, 2.0, 3.0));
    }
}
