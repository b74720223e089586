use kinfu::camera::Intr;
use kinfu::extract::Connectivity;
use kinfu::metrics::PoseDelta;
use kinfu::pose::Pose;
use kinfu::volume::MAX_WEIGHT;
use kinfu::{KinFuParams, KinFuTracker};

use nalgebra::Vector3;
use ndarray::Array2;

const ROWS: usize = 96;
const COLS: usize = 128;

fn test_intr() -> Intr {
    Intr::new(100.0, 100.0, COLS as f32 / 2.0, ROWS as f32 / 2.0)
}

fn test_tracker() -> KinFuTracker {
    let params = KinFuParams {
        volume_resolution: (64, 64, 64),
        ..KinFuParams::default()
    };
    let mut tracker = KinFuTracker::with_params(ROWS, COLS, params);
    tracker.set_depth_intrinsics(100.0, 100.0, None, None).unwrap();
    tracker
}

/// Height of a rippled surface hanging at world z ~ 1.5; the ripples give
/// ICP full 6-DoF constraints.
fn surface_height(x: f32, y: f32) -> f32 {
    1.5 + 0.03 * (8.0 * x).sin() * (6.0 * y).cos()
}

/// Depth frame of the rippled surface seen from `pose`, solved per pixel by
/// fixed-point iteration on the ray/heightfield intersection.
fn render_depth(pose: &Pose) -> Array2<u16> {
    let intr = test_intr();
    let mut depth = Array2::<u16>::zeros((ROWS, COLS));
    for y in 0..ROWS {
        for x in 0..COLS {
            let dir = pose.rotate_vector(&intr.ray_direction(x as f32, y as f32));
            if dir.z.abs() < 1e-6 {
                continue;
            }
            let origin = pose.translation;
            let mut s = (1.5 - origin.z) / dir.z;
            for _ in 0..15 {
                let px = origin.x + s * dir.x;
                let py = origin.y + s * dir.y;
                s = (surface_height(px, py) - origin.z) / dir.z;
            }
            if s > 0.0 {
                depth[(y, x)] = (s * 1000.0).round() as u16;
            }
        }
    }
    depth
}

#[test]
fn default_parameters_match_the_documented_contract() {
    let params = KinFuParams::default();
    assert_eq!(params.volume_resolution, (512, 512, 512));
    assert_eq!(params.volume_size, Vector3::from_element(3.0));
    assert_eq!(params.tranc_dist, 0.03);
    assert_eq!(params.icp.iterations, [10, 5, 4]);
    assert_eq!(params.icp.dist_threshold, 0.10);
    assert!((params.icp.angle_threshold - 20.0f32.to_radians().sin()).abs() < 1e-6);

    let tracker = test_tracker();
    assert_eq!(tracker.rows(), ROWS);
    assert_eq!(tracker.cols(), COLS);
    assert_eq!(tracker.volume_size(), Vector3::from_element(3.0));

    // the camera starts centered in X/Y, pulled back along Z
    let pose = tracker.get_camera_pose(-1);
    assert_eq!(pose.translation.x, 1.5);
    assert_eq!(pose.translation.y, 1.5);
    assert!((pose.translation.z - (1.5 - 1.8)).abs() < 1e-6);

    // truncation distance was clamped against the 64^3 cell size
    assert!(tracker.volume().truncation_distance() >= 2.1 * tracker.volume().max_cell_size());
}

#[test]
fn a_session_survives_several_tracked_frames() {
    let mut tracker = test_tracker();
    let pose0 = tracker.get_camera_pose(-1);

    let steps = [
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(0.002, 0.0, 0.001),
        Vector3::new(0.004, -0.002, 0.002),
        Vector3::new(0.005, -0.003, 0.004),
    ];

    for (frame, offset) in steps.iter().enumerate() {
        let pose = Pose::new(pose0.rotation, pose0.translation + offset);
        let tracked = tracker.process_depth(&render_depth(&pose)).unwrap();
        assert_eq!(tracked, frame > 0, "frame {}", frame);
    }

    assert_eq!(tracker.pose_count(), steps.len());

    let truth = Pose::new(pose0.rotation, pose0.translation + steps[steps.len() - 1]);
    let delta = PoseDelta::new(&truth, &tracker.get_camera_pose(-1));
    assert!(delta.translation < 5e-3, "drift {}", delta.translation);
    assert!(delta.angle < 0.5f32.to_radians(), "rotation drift {}", delta.angle);

    // history indexing is lenient at both ends
    let first = tracker.get_camera_pose(0);
    assert_eq!(first.translation, pose0.translation);
    let clamped = tracker.get_camera_pose(1000);
    assert_eq!(clamped.translation, tracker.get_camera_pose(-1).translation);
}

#[test]
fn the_fused_model_is_extractable_and_dumpable() {
    let mut tracker = test_tracker();
    let pose0 = tracker.get_camera_pose(-1);
    let depth = render_depth(&pose0);

    tracker.process_depth(&depth).unwrap();
    tracker.process_depth(&depth).unwrap();

    let cloud = tracker.cloud_from_volume(Connectivity::TwentySix);
    assert!(cloud.len() > 1000);

    // extracted points sit near the analytic surface
    let mut on_surface = 0;
    for point in cloud.points.iter() {
        if (point.z - surface_height(point.x, point.y)).abs()
            < 1.5 * tracker.volume().max_cell_size()
        {
            on_surface += 1;
        }
    }
    assert!(
        on_surface * 10 > cloud.len() * 9,
        "{} of {} points near the surface",
        on_surface,
        cloud.len()
    );

    let (tsdf, weights) = tracker.tsdf_volume_and_weights();
    assert_eq!(tsdf.len(), 64 * 64 * 64);
    assert_eq!(weights.len(), tsdf.len());
    assert!(tsdf.iter().all(|value| (-1.0..=1.0).contains(value)));
    assert!(weights.iter().all(|&w| (0..=MAX_WEIGHT).contains(&w)));
    assert!(weights.iter().any(|&w| w == 2));

    let dump = tracker.tsdf_volume();
    assert_eq!(dump.len(), tsdf.len());
}

#[test]
fn starving_the_tracker_resets_the_session() {
    let mut tracker = test_tracker();
    let pose0 = tracker.get_camera_pose(-1);
    let depth = render_depth(&pose0);

    tracker.process_depth(&depth).unwrap();
    assert!(tracker.process_depth(&depth).unwrap());
    assert_eq!(tracker.pose_count(), 2);

    let empty = Array2::<u16>::zeros((ROWS, COLS));
    assert!(!tracker.process_depth(&empty).unwrap());
    assert_eq!(tracker.pose_count(), 1);

    let delta = PoseDelta::new(&pose0, &tracker.get_camera_pose(-1));
    assert!(delta.angle == 0.0 && delta.translation == 0.0);

    let (_, weights) = tracker.tsdf_volume_and_weights();
    assert!(weights.iter().all(|&w| w == 0));
}
