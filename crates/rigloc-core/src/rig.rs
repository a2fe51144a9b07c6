//! Rig geometry: camera 0 is the reference frame, camera `i > 0` is placed by
//! a fixed subpose `T_Ci_C0`.

use crate::{Iso3, Pt2, Pt3};
use serde::{Deserialize, Serialize};

/// Borrowed 2D-3D correspondences of one camera.
///
/// `points_2d[i]` is the observation of `points_3d[i]`.
#[derive(Debug, Clone, Copy)]
pub struct CameraCorrespondences<'a> {
    pub points_2d: &'a [Pt2],
    pub points_3d: &'a [Pt3],
}

impl<'a> CameraCorrespondences<'a> {
    pub fn new(points_2d: &'a [Pt2], points_3d: &'a [Pt3]) -> Self {
        Self {
            points_2d,
            points_3d,
        }
    }

    pub fn len(&self) -> usize {
        self.points_2d.len().min(self.points_3d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed relative placement of the cameras of a rig.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigGeometry {
    /// `subposes[i - 1]` maps camera-0 coordinates into camera `i`.
    pub subposes: Vec<Iso3>,
}

impl RigGeometry {
    pub fn new(subposes: Vec<Iso3>) -> Self {
        Self { subposes }
    }

    /// Rig made of a single camera.
    pub fn single() -> Self {
        Self::default()
    }

    /// Number of cameras, including the reference camera.
    pub fn num_cameras(&self) -> usize {
        self.subposes.len() + 1
    }

    /// Transform from the rig frame (camera 0) into camera `camera`.
    pub fn camera_from_rig(&self, camera: usize) -> Option<Iso3> {
        camera_from_rig(&self.subposes, camera)
    }

    /// Pose of camera `camera` given the rig pose.
    pub fn camera_pose(&self, rig_pose: &Iso3, camera: usize) -> Option<Iso3> {
        camera_pose_from_rig(rig_pose, &self.subposes, camera)
    }

    /// Rig pose recovered from the pose of camera `camera`.
    pub fn rig_pose(&self, camera_pose: &Iso3, camera: usize) -> Option<Iso3> {
        rig_pose_from_camera(camera_pose, &self.subposes, camera)
    }
}

/// `T_Ci_C0` for a camera index; identity for camera 0.
pub fn camera_from_rig(subposes: &[Iso3], camera: usize) -> Option<Iso3> {
    match camera {
        0 => Some(Iso3::identity()),
        i => subposes.get(i - 1).copied(),
    }
}

/// `pose_i = subpose_i * rig_pose` (camera 0 returns the rig pose itself).
pub fn camera_pose_from_rig(rig_pose: &Iso3, subposes: &[Iso3], camera: usize) -> Option<Iso3> {
    match camera {
        0 => Some(*rig_pose),
        i => subposes.get(i - 1).map(|sub| sub * rig_pose),
    }
}

/// `rig_pose = subpose_i⁻¹ * pose_i` (camera 0 returns its own pose).
pub fn rig_pose_from_camera(camera_pose: &Iso3, subposes: &[Iso3], camera: usize) -> Option<Iso3> {
    match camera {
        0 => Some(*camera_pose),
        i => subposes.get(i - 1).map(|sub| sub.inverse() * camera_pose),
    }
}
