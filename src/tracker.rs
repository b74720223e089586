use itertools::izip;
use log::info;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array1, Array2, Array3};

use crate::bilateral::BilateralFilter;
use crate::camera::Intr;
use crate::error::Error;
use crate::extract::{extract_colors, extract_normals, extract_points, Connectivity};
use crate::frame::{resize_nmap, resize_vmap, transform_maps, FramePyramid, LEVELS};
use crate::icp::{FrameToModelIcp, IcpParams};
use crate::pointcloud::PointCloud;
use crate::pose::Pose;
use crate::raycast::{generate_image, raycast};
use crate::trajectory::Trajectory;
use crate::utils::access::fill_invalid;
use crate::view::View;
use crate::volume::{ColorVolume, TsdfVolume};

/// Construction parameters of the tracker.
///
/// The volume resolution is fixed for the tracker's lifetime; everything
/// else can be adjusted through the setters before a session starts.
#[derive(Debug, Clone)]
pub struct KinFuParams {
    pub volume_resolution: (usize, usize, usize),
    /// Metric side lengths of the reconstruction cube, in meters.
    pub volume_size: Vector3<f32>,
    /// TSDF truncation distance in meters, clamped against the cell size.
    pub tranc_dist: f32,
    pub icp: IcpParams,
    /// Depth truncation applied to the tracking pyramid only; `0` disables.
    pub max_icp_distance: f32,
}

impl Default for KinFuParams {
    fn default() -> Self {
        Self {
            volume_resolution: (512, 512, 512),
            volume_size: Vector3::from_element(3.0),
            tranc_dist: 0.03,
            icp: IcpParams::default(),
            max_icp_distance: 0.0,
        }
    }
}

/// Dense volumetric reconstruction and camera tracking over an RGB-D
/// stream.
///
/// Owns the TSDF volume, the pose history and every per-frame buffer; all
/// of them are allocated once at construction. Frames are fed through
/// [`KinFuTracker::process_depth`]; the surface model can be inspected at
/// any time through the raycast view and the extraction operations.
pub struct KinFuTracker {
    rows: usize,
    cols: usize,
    intr: Intr,
    init_pose: Pose,
    poses: Trajectory,
    global_time: usize,

    volume: TsdfVolume,
    colors: Option<ColorVolume>,

    pyramid: FramePyramid,
    vmaps_prev: Vec<Array3<f32>>,
    nmaps_prev: Vec<Array3<f32>>,

    icp_params: IcpParams,
    bilateral: BilateralFilter,
    max_icp_distance: f32,
}

impl KinFuTracker {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_params(rows, cols, KinFuParams::default())
    }

    pub fn with_params(rows: usize, cols: usize, params: KinFuParams) -> Self {
        let volume = TsdfVolume::new(params.volume_resolution, params.volume_size, params.tranc_dist);

        let size = volume.size();
        let init_pose = Pose::new(
            Matrix3::identity(),
            size * 0.5 - Vector3::new(0.0, 0.0, size.z * 0.6),
        );

        let mut poses = Trajectory::with_capacity(30000);
        poses.restart(init_pose);

        let mut vmaps_prev = Vec::with_capacity(LEVELS);
        let mut nmaps_prev = Vec::with_capacity(LEVELS);
        for level in 0..LEVELS {
            let (r, c) = (rows >> level, cols >> level);
            let mut vmap = Array3::zeros((r, c, 3));
            let mut nmap = Array3::zeros((r, c, 3));
            fill_invalid(&mut vmap);
            fill_invalid(&mut nmap);
            vmaps_prev.push(vmap);
            nmaps_prev.push(nmap);
        }

        Self {
            rows,
            cols,
            intr: Intr::new(525.0, 525.0, cols as f32 / 2.0, rows as f32 / 2.0),
            init_pose,
            poses,
            global_time: 0,
            volume,
            colors: None,
            pyramid: FramePyramid::new(rows, cols),
            vmaps_prev,
            nmaps_prev,
            icp_params: params.icp,
            bilateral: BilateralFilter::default(),
            max_icp_distance: params.max_icp_distance,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set_depth_intrinsics(
        &mut self,
        fx: f32,
        fy: f32,
        cx: Option<f32>,
        cy: Option<f32>,
    ) -> Result<(), Error> {
        if !fx.is_finite() || !fy.is_finite() || fx <= 0.0 || fy <= 0.0 {
            return Err(Error::invalid_parameter(format!(
                "focal lengths must be positive, got ({}, {})",
                fx, fy
            )));
        }
        self.intr = Intr::new(
            fx,
            fy,
            cx.unwrap_or(self.cols as f32 / 2.0),
            cy.unwrap_or(self.rows as f32 / 2.0),
        );
        Ok(())
    }

    pub fn set_volume_size(&mut self, size: Vector3<f32>) -> Result<(), Error> {
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
            return Err(Error::invalid_parameter(format!(
                "volume size must be positive on every axis, got ({}, {}, {})",
                size.x, size.y, size.z
            )));
        }
        self.volume.set_size(size);
        if let Some(colors) = self.colors.as_mut() {
            colors.set_size(size);
        }
        Ok(())
    }

    pub fn volume_size(&self) -> Vector3<f32> {
        self.volume.size()
    }

    pub fn volume(&self) -> &TsdfVolume {
        &self.volume
    }

    /// Sets the pose the session starts from. Takes effect immediately when
    /// no frame has been processed yet, and on the next `reset` otherwise.
    pub fn set_initial_camera_pose(&mut self, pose: Pose) {
        self.init_pose = pose;
        if self.global_time == 0 {
            self.poses.restart(pose);
        }
    }

    /// Sets the TSDF truncation distance; the volume clamps it from below
    /// against its cell size.
    pub fn set_tsdf_truncation_distance(&mut self, distance: f32) -> Result<(), Error> {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Error::invalid_parameter(format!(
                "truncation distance must be positive, got {}",
                distance
            )));
        }
        self.volume.set_truncation_distance(distance);
        Ok(())
    }

    /// Sets the depth truncation applied to the tracking pyramid; `0`
    /// disables it.
    pub fn set_depth_truncation_for_icp(&mut self, max_icp_distance: f32) -> Result<(), Error> {
        if !max_icp_distance.is_finite() || max_icp_distance < 0.0 {
            return Err(Error::invalid_parameter(format!(
                "depth truncation must be zero or positive, got {}",
                max_icp_distance
            )));
        }
        self.max_icp_distance = max_icp_distance;
        Ok(())
    }

    /// Sets the correspondence filters: the maximum point distance in
    /// meters and the sine of the maximum normal angle.
    pub fn set_icp_filtering(
        &mut self,
        dist_threshold: f32,
        sine_of_angle: f32,
    ) -> Result<(), Error> {
        if !dist_threshold.is_finite() || dist_threshold <= 0.0 {
            return Err(Error::invalid_parameter(format!(
                "distance threshold must be positive, got {}",
                dist_threshold
            )));
        }
        if !(sine_of_angle > 0.0 && sine_of_angle <= 1.0) {
            return Err(Error::invalid_parameter(format!(
                "normal filter takes the sine of an angle, got {}",
                sine_of_angle
            )));
        }
        self.icp_params.dist_threshold = dist_threshold;
        self.icp_params.angle_threshold = sine_of_angle;
        Ok(())
    }

    /// Number of poses recorded so far (one per bootstrap or tracked frame).
    pub fn pose_count(&self) -> usize {
        self.poses.len()
    }

    /// Camera-to-world pose at frame `time`; out-of-range times return the
    /// latest pose, and `-1` is the conventional way to ask for it.
    pub fn get_camera_pose(&self, time: i64) -> Pose {
        *self.poses.get(time)
    }

    /// Drops all fused data and restarts the session from the initial pose.
    pub fn reset(&mut self) {
        if self.global_time > 0 {
            info!("reset");
        }
        self.global_time = 0;
        self.poses.restart(self.init_pose);
        self.volume.clear();
        if let Some(colors) = self.colors.as_mut() {
            colors.clear();
        }
        for level in 0..LEVELS {
            fill_invalid(&mut self.vmaps_prev[level]);
            fill_invalid(&mut self.nmaps_prev[level]);
        }
    }

    /// Processes one depth frame: preprocess, track, fuse, and re-render the
    /// model prediction for the next frame.
    ///
    /// # Returns
    ///
    /// * `Ok(false)` on the bootstrap frame and on tracking failures (which
    ///   also reset the session and drop the frame).
    /// * `Ok(true)` when the frame was tracked and fused.
    /// * `Err` on malformed input; no state is mutated in that case.
    pub fn process_depth(&mut self, depth_raw: &Array2<u16>) -> Result<bool, Error> {
        if depth_raw.is_empty() {
            return Err(Error::invalid_input("empty depth frame"));
        }
        if depth_raw.dim() != (self.rows, self.cols) {
            return Err(Error::invalid_input(format!(
                "depth frame is {:?}, tracker expects {:?}",
                depth_raw.dim(),
                (self.rows, self.cols)
            )));
        }

        self.pyramid
            .process(depth_raw, &self.intr, &self.bilateral, self.max_icp_distance);

        if self.global_time == 0 {
            let pose = *self.poses.latest();
            self.volume.integrate(depth_raw, &self.intr, &pose);

            // the first prediction comes straight from the measured maps
            for (vmap, nmap, vmap_prev, nmap_prev) in izip!(
                &self.pyramid.vmaps,
                &self.pyramid.nmaps,
                &mut self.vmaps_prev,
                &mut self.nmaps_prev
            ) {
                transform_maps(vmap, nmap, &pose, vmap_prev, nmap_prev);
            }

            self.global_time += 1;
            return Ok(false);
        }

        let prev_pose = *self.poses.latest();
        let icp = FrameToModelIcp::new(&self.icp_params, self.intr);
        let pose = match icp.align(&self.pyramid, &self.vmaps_prev, &self.nmaps_prev, &prev_pose) {
            Some(pose) => pose,
            None => {
                self.reset();
                return Ok(false);
            }
        };
        self.poses.push(pose);

        self.volume.integrate(depth_raw, &self.intr, &pose);

        raycast(
            &self.volume,
            &self.intr,
            &pose,
            &mut self.vmaps_prev[0],
            &mut self.nmaps_prev[0],
        );
        for level in 1..LEVELS {
            let (fine_v, coarse_v) = self.vmaps_prev.split_at_mut(level);
            resize_vmap(&fine_v[level - 1], &mut coarse_v[0]);
            let (fine_n, coarse_n) = self.nmaps_prev.split_at_mut(level);
            resize_nmap(&fine_n[level - 1], &mut coarse_n[0]);
        }

        self.global_time += 1;
        Ok(true)
    }

    /// Allocates the color volume; colors of subsequent tracked frames are
    /// blended under the given weight cap.
    pub fn init_color_integration(&mut self, max_weight: u8) {
        self.colors = Some(ColorVolume::new(
            self.volume.resolution(),
            self.volume.size(),
            max_weight,
        ));
    }

    /// Processes a depth frame and, when it tracks successfully, fuses the
    /// paired color frame into the color volume.
    ///
    /// Color frames may be RGB or RGBA; only the first three channels are
    /// read. Requires [`KinFuTracker::init_color_integration`].
    pub fn process_depth_and_color(
        &mut self,
        depth_raw: &Array2<u16>,
        colors: &Array3<u8>,
    ) -> Result<bool, Error> {
        if self.colors.is_none() {
            return Err(Error::invalid_input("color integration not initialized"));
        }
        let (rows, cols, channels) = colors.dim();
        if (rows, cols) != (self.rows, self.cols) || channels < 3 {
            return Err(Error::invalid_input(format!(
                "color frame is {:?}, tracker expects ({}, {}, 3+)",
                colors.dim(),
                self.rows,
                self.cols
            )));
        }

        let tracked = self.process_depth(depth_raw)?;
        if tracked {
            let pose = *self.poses.latest();
            if let Some(color_volume) = self.colors.as_mut() {
                color_volume.update(&self.vmaps_prev[0], colors, &self.intr, &pose);
            }
        }
        Ok(tracked)
    }

    /// Shades the latest predicted surface from a point light; the default
    /// light sits at `-3` times the volume size, far behind the camera.
    pub fn get_image(&self, light_pos: Option<Vector3<f32>>) -> View {
        let light = light_pos.unwrap_or(self.volume.size() * -3.0);
        let mut view = View::zeros((self.rows, self.cols, 4));
        generate_image(&self.vmaps_prev[0], &self.nmaps_prev[0], &light, &mut view);
        view
    }

    /// Raycasts the volume from an arbitrary pose and shades it, for
    /// previews independent of the tracked camera.
    pub fn get_image_from_pose(&self, pose: &Pose) -> View {
        let mut vmap = Array3::zeros((self.rows, self.cols, 3));
        let mut nmap = Array3::zeros((self.rows, self.cols, 3));
        raycast(&self.volume, &self.intr, pose, &mut vmap, &mut nmap);

        let light = self.volume.size() * -3.0;
        let mut view = View::zeros((self.rows, self.cols, 4));
        generate_image(&vmap, &nmap, &light, &mut view);
        view
    }

    /// The latest predicted world-frame vertex map.
    pub fn last_frame_cloud(&self) -> &Array3<f32> {
        &self.vmaps_prev[0]
    }

    /// The latest predicted world-frame normal map.
    pub fn last_frame_normals(&self) -> &Array3<f32> {
        &self.nmaps_prev[0]
    }

    /// Extracts the fused surface as a point cloud.
    pub fn cloud_from_volume(&self, connectivity: Connectivity) -> PointCloud {
        extract_points(&self.volume, connectivity)
    }

    /// Per-point surface normals from the TSDF gradient.
    pub fn normals_from_volume(&self, cloud: &PointCloud) -> Array1<Vector3<f32>> {
        extract_normals(&self.volume, cloud)
    }

    /// Per-point colors from the color volume, or `None` when color
    /// integration is not initialized.
    pub fn colors_from_volume(&self, cloud: &PointCloud) -> Option<Array1<Vector3<u8>>> {
        self.colors
            .as_ref()
            .map(|colors| extract_colors(colors, cloud))
    }

    /// Host dump of the TSDF grid as floats, X-fastest.
    pub fn tsdf_volume(&self) -> Vec<f32> {
        self.volume.to_tsdf()
    }

    /// Host dump of the TSDF grid and its weights.
    pub fn tsdf_volume_and_weights(&self) -> (Vec<f32>, Vec<i16>) {
        self.volume.to_tsdf_and_weights()
    }
}
