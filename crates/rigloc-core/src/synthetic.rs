//! Deterministic synthetic scenes used by tests across the workspace.
//!
//! Points are generated by back-projecting a pixel grid to varying depths so
//! every point is visible and the set is never coplanar.

use crate::{CameraIntrinsics, FxFyCxCySkew, IntrinsicsModel, Iso3, Pt2, Pt3, Real, RigGeometry};
use anyhow::Result;
use nalgebra::{Rotation3, Translation3, Vector2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// 1280x720 camera with a 900 px focal length.
pub fn default_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::new(
        FxFyCxCySkew {
            fx: 900.0,
            fy: 900.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        },
        1280,
        720,
    )
}

/// Pose `T_C_W` from Euler angles (roll, pitch, yaw) and a translation.
pub fn pose(angles: [Real; 3], translation: [Real; 3]) -> Iso3 {
    Iso3::from_parts(
        Translation3::new(translation[0], translation[1], translation[2]),
        Rotation3::from_euler_angles(angles[0], angles[1], angles[2]).into(),
    )
}

/// World points visible from `pose` on an `nx * ny` pixel grid.
///
/// Depths cycle through `depth`, `depth + 0.4`, ... to avoid planar
/// configurations. Points are ordered row-major.
pub fn visible_points(
    intrinsics: &CameraIntrinsics,
    pose: &Iso3,
    nx: usize,
    ny: usize,
    depth: Real,
) -> Vec<Pt3> {
    let w = intrinsics.width as Real;
    let h = intrinsics.height as Real;
    let mut points = Vec::with_capacity(nx * ny);
    let world_from_cam = pose.inverse();
    for j in 0..ny {
        for i in 0..nx {
            let u = w * (i as Real + 1.0) / (nx as Real + 1.0);
            let v = h * (j as Real + 1.0) / (ny as Real + 1.0);
            let s = intrinsics.k.pixel_to_sensor(&Vector2::new(u, v));
            let z = depth + 0.4 * ((i * 3 + j * 5) % 4) as Real;
            let pc = Pt3::new(s.x * z, s.y * z, z);
            points.push(world_from_cam.transform_point(&pc));
        }
    }
    points
}

/// Project world points through `pose`, failing if any lands behind the camera.
pub fn project_all(intrinsics: &CameraIntrinsics, pose: &Iso3, points: &[Pt3]) -> Result<Vec<Pt2>> {
    points
        .iter()
        .enumerate()
        .map(|(idx, pw)| {
            let pc = pose.transform_point(pw);
            intrinsics
                .project(&pc)
                .ok_or_else(|| anyhow::anyhow!("point {idx} not projectable (z={:.6})", pc.z))
        })
        .collect()
}

/// Add uniform pixel noise in `[-amplitude, amplitude]` with a fixed seed.
pub fn jitter(pixels: &[Pt2], amplitude: Real, seed: u64) -> Vec<Pt2> {
    let mut rng = StdRng::seed_from_u64(seed);
    pixels
        .iter()
        .map(|p| {
            let dx: Real = rng.random_range(-amplitude..=amplitude);
            let dy: Real = rng.random_range(-amplitude..=amplitude);
            Pt2::new(p.x + dx, p.y + dy)
        })
        .collect()
}

/// Two-camera rig with the second camera `baseline` meters to the right,
/// slightly toed in.
pub fn stereo_rig(baseline: Real) -> RigGeometry {
    RigGeometry::new(vec![pose([0.0, -0.05, 0.0], [-baseline, 0.0, 0.0])])
}

/// Three cameras looking forward, left and right (±0.6 rad about the vertical axis).
pub fn tri_camera_rig() -> RigGeometry {
    RigGeometry::new(vec![
        pose([0.0, 0.6, 0.0], [0.1, 0.0, 0.0]),
        pose([0.0, -0.6, 0.0], [-0.1, 0.0, 0.0]),
    ])
}
