use nalgebra::Vector3;
use rayon::prelude::*;

/// Fixed-point scale of the stored TSDF: `±DIVISOR` maps to `±1.0`.
pub const DIVISOR: i16 = 32767;

/// Cap on the per-voxel observation count.
pub const MAX_WEIGHT: i16 = 128;

/// One voxel of the signed-distance grid: fixed-point TSDF plus the running
/// observation weight, packed into 32 bits.
///
/// A voxel with `tsdf == DIVISOR` and `weight == 0` has never been observed.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TsdfVoxel {
    pub tsdf: i16,
    pub weight: i16,
}

impl TsdfVoxel {
    pub const UNOBSERVED: TsdfVoxel = TsdfVoxel {
        tsdf: DIVISOR,
        weight: 0,
    };

    /// The TSDF as a float in `[-1, 1]`.
    #[inline]
    pub fn value(&self) -> f32 {
        self.tsdf as f32 / DIVISOR as f32
    }

    #[inline]
    pub fn pack(value: f32, weight: i16) -> Self {
        Self {
            tsdf: (value.clamp(-1.0, 1.0) * DIVISOR as f32) as i16,
            weight,
        }
    }

    /// Whether the voxel carries a usable observation. The `DIVISOR` value
    /// itself is reserved and treated as unobserved even under nonzero
    /// weight.
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0 && self.tsdf != DIVISOR
    }
}

/// Dense truncated signed-distance grid over a fixed axis-aligned metric
/// cube anchored at the world origin.
///
/// Voxels are stored X-fastest, then Y, then Z. The resolution is fixed at
/// construction; the metric size may be adjusted before a session starts.
pub struct TsdfVolume {
    voxels: Vec<TsdfVoxel>,
    resolution: (usize, usize, usize),
    size: Vector3<f32>,
    tranc_dist: f32,
}

impl TsdfVolume {
    pub fn new(resolution: (usize, usize, usize), size: Vector3<f32>, tranc_dist: f32) -> Self {
        let mut volume = Self {
            voxels: vec![TsdfVoxel::UNOBSERVED; resolution.0 * resolution.1 * resolution.2],
            resolution,
            size,
            tranc_dist: 0.0,
        };
        volume.set_truncation_distance(tranc_dist);
        volume
    }

    /// Marks every voxel unobserved.
    pub fn clear(&mut self) {
        self.voxels
            .par_iter_mut()
            .for_each(|voxel| *voxel = TsdfVoxel::UNOBSERVED);
    }

    pub fn resolution(&self) -> (usize, usize, usize) {
        self.resolution
    }

    pub fn size(&self) -> Vector3<f32> {
        self.size
    }

    pub fn set_size(&mut self, size: Vector3<f32>) {
        self.size = size;
        self.set_truncation_distance(self.tranc_dist);
    }

    pub fn truncation_distance(&self) -> f32 {
        self.tranc_dist
    }

    /// Sets the truncation distance, clamped from below so that the
    /// truncation band always spans a bit more than two voxels.
    pub fn set_truncation_distance(&mut self, distance: f32) {
        self.tranc_dist = distance.max(2.1 * self.max_cell_size());
    }

    /// Metric edge lengths of one voxel.
    pub fn cell_size(&self) -> Vector3<f32> {
        Vector3::new(
            self.size.x / self.resolution.0 as f32,
            self.size.y / self.resolution.1 as f32,
            self.size.z / self.resolution.2 as f32,
        )
    }

    pub fn max_cell_size(&self) -> f32 {
        let cell = self.cell_size();
        cell.x.max(cell.y).max(cell.z)
    }

    #[inline]
    pub(crate) fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.resolution.1 + y) * self.resolution.0 + x
    }

    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> TsdfVoxel {
        self.voxels[self.index(x, y, z)]
    }

    #[inline]
    pub(crate) fn voxel_mut(&mut self, x: usize, y: usize, z: usize) -> &mut TsdfVoxel {
        let index = self.index(x, y, z);
        &mut self.voxels[index]
    }

    pub(crate) fn voxels_mut(&mut self) -> &mut [TsdfVoxel] {
        &mut self.voxels
    }

    /// Metric center of voxel `(x, y, z)`.
    #[inline]
    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Vector3<f32> {
        let cell = self.cell_size();
        Vector3::new(
            (x as f32 + 0.5) * cell.x,
            (y as f32 + 0.5) * cell.y,
            (z as f32 + 0.5) * cell.z,
        )
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

    /// TSDF at the voxel containing `point`, without interpolation.
    /// Unobserved voxels read as `+1`; outside the grid reads as `None`.
    pub fn read_nearest(&self, point: &Vector3<f32>) -> Option<f32> {
        let (x, y, z) = self.voxel_of_point(point)?;
        Some(self.voxel(x, y, z).value())
    }

    /// Trilinearly interpolated TSDF at a metric point.
    ///
    /// `None` when the sample stencil leaves the grid or touches an
    /// unobserved voxel.
    pub fn interpolate(&self, point: &Vector3<f32>) -> Option<f32> {
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

        let mut value = 0.0;
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let voxel = self.voxel(x0 + dx, y0 + dy, z0 + dz);
                    if voxel.weight == 0 {
                        return None;
                    }
                    let weight = (if dx == 0 { 1.0 - ax } else { ax })
                        * (if dy == 0 { 1.0 - ay } else { ay })
                        * (if dz == 0 { 1.0 - az } else { az });
                    value += voxel.value() * weight;
                }
            }
        }
        Some(value)
    }

    /// Host dump of the whole grid as floats, X-fastest.
    pub fn to_tsdf(&self) -> Vec<f32> {
        self.voxels.par_iter().map(|voxel| voxel.value()).collect()
    }

    /// Host dump of TSDF values and weights.
    pub fn to_tsdf_and_weights(&self) -> (Vec<f32>, Vec<i16>) {
        (
            self.to_tsdf(),
            self.voxels.par_iter().map(|voxel| voxel.weight).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn small_volume() -> TsdfVolume {
        TsdfVolume::new((16, 16, 16), Vector3::new(1.6, 1.6, 1.6), 0.25)
    }

    #[rstest]
    fn starts_unobserved(small_volume: TsdfVolume) {
        let volume = small_volume;
        assert_eq!(volume.voxel(3, 4, 5), TsdfVoxel::UNOBSERVED);
        assert!(!volume.voxel(3, 4, 5).is_observed());
        assert_eq!(volume.voxel(0, 0, 0).value(), 1.0);
    }

    #[rstest]
    fn truncation_distance_is_clamped_to_the_cell_size(small_volume: TsdfVolume) {
        let volume = TsdfVolume::new((16, 16, 16), Vector3::new(1.6, 1.6, 1.6), 0.001);
        // cell size 0.1 -> lower bound 0.21
        assert!((volume.truncation_distance() - 0.21).abs() < 1e-6);

        assert_eq!(small_volume.truncation_distance(), 0.25);
    }

    #[test]
    fn fixed_point_roundtrip_is_within_one_step() {
        for value in [-1.0f32, -0.5, -0.1, 0.0, 0.25, 0.999, 1.0] {
            let voxel = TsdfVoxel::pack(value, 1);
            assert!((voxel.value() - value).abs() < 1.0 / DIVISOR as f32);
        }
    }

    #[rstest]
    fn voxel_of_point_rejects_outside_points(small_volume: TsdfVolume) {
        let volume = small_volume;
        assert_eq!(
            volume.voxel_of_point(&Vector3::new(0.05, 0.05, 0.05)),
            Some((0, 0, 0))
        );
        assert!(volume.voxel_of_point(&Vector3::new(-0.01, 0.5, 0.5)).is_none());
        assert!(volume.voxel_of_point(&Vector3::new(1.7, 0.5, 0.5)).is_none());
    }

    #[rstest]
    fn interpolation_blends_neighbor_voxels(small_volume: TsdfVolume) {
        let mut volume = small_volume;
        for z in 0..16 {
            for y in 0..16 {
                for x in 0..16 {
                    let value = if x < 8 { 0.2 } else { -0.4 };
                    *volume.voxel_mut(x, y, z) = TsdfVoxel::pack(value, 1);
                }
            }
        }

        // halfway between the centers of voxels 7 and 8 along X
        let point = Vector3::new(0.8, 0.8, 0.8);
        let value = volume.interpolate(&point).unwrap();
        assert!((value - (-0.1)).abs() < 1e-3);
    }

    #[rstest]
    fn interpolation_refuses_unobserved_stencils(small_volume: TsdfVolume) {
        let volume = small_volume;
        assert!(volume.interpolate(&Vector3::new(0.8, 0.8, 0.8)).is_none());
    }

    #[rstest]
    fn dumps_divide_by_the_fixed_point_scale(small_volume: TsdfVolume) {
        let mut volume = small_volume;
        *volume.voxel_mut(1, 2, 3) = TsdfVoxel {
            tsdf: -16384,
            weight: 7,
        };

        let (tsdf, weights) = volume.to_tsdf_and_weights();
        let index = (3 * 16 + 2) * 16 + 1;
        assert!((tsdf[index] - (-16384.0 / 32767.0)).abs() < 1e-6);
        assert_eq!(weights[index], 7);
        assert_eq!(tsdf.len(), 16 * 16 * 16);
    }
}
