use nalgebra::Vector3;
use ndarray::parallel::prelude::*;
use ndarray::{Array3, Axis};

use crate::camera::Intr;
use crate::pose::Pose;
use crate::utils::access::get_vec3;
use crate::volume::TsdfVolume;

/// Clips a ray against the axis-aligned box `[0, bound]`.
fn ray_box_intersection(
    origin: &Vector3<f32>,
    direction: &Vector3<f32>,
    bound: &Vector3<f32>,
) -> Option<(f32, f32)> {
    let mut t_enter = f32::MIN;
    let mut t_exit = f32::MAX;
    for axis in 0..3 {
        let inv = 1.0 / direction[axis];
        let t0 = (0.0 - origin[axis]) * inv;
        let t1 = (bound[axis] - origin[axis]) * inv;
        let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
        t_enter = t_enter.max(near);
        t_exit = t_exit.min(far);
    }
    if t_enter < t_exit && t_exit > 0.0 {
        Some((t_enter.max(0.0), t_exit))
    } else {
        None
    }
}

/// Renders the zero isosurface of the TSDF as seen from `pose` into dense
/// world-frame vertex and normal maps.
///
/// Rays march through the volume in half-truncation steps reading the
/// nearest voxel; a positive-to-negative sign change is refined by secant
/// interpolation on trilinear samples, and the normal is the normalized
/// central-difference gradient there. Pixels whose ray misses the volume,
/// never crosses the surface, or crosses it between unobserved samples are
/// set to NaN.
pub fn raycast(
    volume: &TsdfVolume,
    intr: &Intr,
    pose: &Pose,
    vmap: &mut Array3<f32>,
    nmap: &mut Array3<f32>,
) {
    let cols = vmap.dim().1;
    let bound = volume.size();
    let step = volume.truncation_distance() * 0.5;
    let cell = volume.cell_size();
    let origin = pose.translation;

    vmap.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(nmap.axis_iter_mut(Axis(0)).into_par_iter())
        .enumerate()
        .for_each(|(y, (mut vrow, mut nrow))| {
            for x in 0..cols {
                let mut vertex = Vector3::from_element(f32::NAN);
                let mut normal = Vector3::from_element(f32::NAN);

                let direction = pose
                    .rotate_vector(&intr.ray_direction(x as f32, y as f32))
                    .normalize();

                if let Some((t_enter, t_exit)) =
                    ray_box_intersection(&origin, &direction, &bound)
                {
                    let mut time = t_enter + 1e-4;
                    let mut tsdf_prev = volume
                        .read_nearest(&(origin + direction * time))
                        .unwrap_or(1.0);

                    while time + step < t_exit {
                        time += step;
                        let tsdf = match volume.read_nearest(&(origin + direction * time)) {
                            Some(value) => value,
                            None => break,
                        };

                        if tsdf_prev < 0.0 && tsdf >= 0.0 {
                            // surface seen from behind
                            break;
                        }
                        if tsdf_prev >= 0.0 && tsdf < 0.0 {
                            let ft = volume.interpolate(&(origin + direction * (time - step)));
                            let ftdt = volume.interpolate(&(origin + direction * time));
                            if let (Some(ft), Some(ftdt)) = (ft, ftdt) {
                                if ft > ftdt {
                                    let crossing = time - step + step * ft / (ft - ftdt);
                                    let point = origin + direction * crossing;
                                    vertex = point;
                                    normal = surface_gradient(volume, &point, &cell)
                                        .unwrap_or_else(|| Vector3::from_element(f32::NAN));
                                }
                            }
                            break;
                        }
                        tsdf_prev = tsdf;
                    }
                }

                for lane in 0..3 {
                    vrow[(x, lane)] = vertex[lane];
                    nrow[(x, lane)] = normal[lane];
                }
            }
        });
}

fn surface_gradient(
    volume: &TsdfVolume,
    point: &Vector3<f32>,
    cell: &Vector3<f32>,
) -> Option<Vector3<f32>> {
    let mut gradient = Vector3::zeros();
    for axis in 0..3 {
        let mut forward = *point;
        let mut backward = *point;
        forward[axis] += cell[axis];
        backward[axis] -= cell[axis];
        gradient[axis] = (volume.interpolate(&forward)? - volume.interpolate(&backward)?)
            / (2.0 * cell[axis]);
    }

    let magnitude = gradient.norm();
    if magnitude > 1e-6 {
        Some(gradient / magnitude)
    } else {
        None
    }
}

/// Lambertian shading of a predicted vertex/normal map pair from a point
/// light, into an RGBA view. Invalid pixels come out fully transparent
/// black.
pub fn generate_image(
    vmap: &Array3<f32>,
    nmap: &Array3<f32>,
    light_pos: &Vector3<f32>,
    view: &mut Array3<u8>,
) {
    let cols = view.dim().1;
    let vmap_view = vmap.view();
    let nmap_view = nmap.view();

    view.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..cols {
                let vertex = get_vec3(&vmap_view, y, x);
                let normal = get_vec3(&nmap_view, y, x);

                let (gray, alpha) = if vertex.x.is_nan() || normal.x.is_nan() {
                    (0, 0)
                } else {
                    let to_light = light_pos - vertex;
                    let magnitude = to_light.norm();
                    let diffuse = if magnitude > 1e-6 {
                        (normal.dot(&to_light) / magnitude).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    ((diffuse * 255.0) as u8, 255)
                };

                row[(x, 0)] = gray;
                row[(x, 1)] = gray;
                row[(x, 2)] = gray;
                row[(x, 3)] = alpha;
            }
        });
}

/// Blends an RGB frame over a shaded view in place.
pub fn paint_view(rgb: &Array3<u8>, view: &mut Array3<u8>, colors_weight: f32) {
    let weight = colors_weight.clamp(0.0, 1.0);
    let cols = view.dim().1;
    let rgb_view = rgb.view();

    view.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..cols {
                for channel in 0..3 {
                    let shaded = row[(x, channel)] as f32;
                    let color = rgb_view[(y, x, channel)] as f32;
                    row[(x, channel)] = (shaded * (1.0 - weight) + color * weight) as u8;
                }
                row[(x, 3)] = 255;
            }
        });
}
