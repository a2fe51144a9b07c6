//! Multi-camera (non-central) resection of a rig pose.
//!
//! All cameras' correspondences are pooled. A hypothesis is generated from
//! three correspondences observed by the same camera (P3P in that camera's
//! frame, mapped back to the rig frame through its subpose) and checked
//! against a fourth correspondence from any camera. Inliers are decided by
//! the angle between the observed bearing and the direction to the
//! transformed landmark.

use crate::pnp::p3p_bearings;
use anyhow::{bail, ensure, Result};
use log::debug;
use rigloc_core::{
    angle_between, ransac, CameraCorrespondences, CameraIntrinsics, Estimator, Iso3, Pt3,
    RansacOptions, Real, RigGeometry, Vec3, MIN_DEPTH,
};

/// Samples per rig hypothesis: three for P3P plus one for disambiguation.
pub const RIG_MIN_SAMPLES: usize = 4;

/// Options for [`resect_rig`].
#[derive(Debug, Clone)]
pub struct RigResectionOptions {
    /// Angular inlier threshold in radians.
    pub angular_threshold: Real,
    pub max_iters: usize,
    pub confidence: Real,
    pub seed: u64,
}

impl Default for RigResectionOptions {
    fn default() -> Self {
        Self {
            angular_threshold: 0.1_f64.to_radians(),
            max_iters: 1024,
            confidence: 0.999,
            seed: 1_234_567,
        }
    }
}

/// Outcome of a successful rig resection.
#[derive(Debug, Clone)]
pub struct RigResection {
    /// Rig pose `T_C0_W`.
    pub rig_pose: Iso3,
    /// Per camera, indices of inlier correspondences into that camera's input.
    pub inliers: Vec<Vec<usize>>,
    /// RMS angular residual over all inliers, in radians.
    pub inlier_rms: Real,
}

impl RigResection {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().map(Vec::len).sum()
    }

    /// Number of cameras contributing at least one inlier.
    pub fn cameras_with_inliers(&self) -> usize {
        self.inliers.iter().filter(|v| !v.is_empty()).count()
    }
}

#[derive(Debug, Clone)]
struct RigDatum {
    camera: usize,
    local_index: usize,
    cam_from_rig: Iso3,
    bearing: Vec3,
    point: Pt3,
}

struct RigP3pEstimator;

impl RigP3pEstimator {
    /// Indices (into the sample) of three samples sharing a camera, and the
    /// remaining one.
    fn split_sample(data: &[RigDatum], sample: &[usize]) -> Option<([usize; 3], usize)> {
        for &anchor in sample {
            let cam = data[anchor].camera;
            let same: Vec<usize> = sample
                .iter()
                .copied()
                .filter(|&i| data[i].camera == cam)
                .collect();
            if same.len() >= 3 {
                let triple = [same[0], same[1], same[2]];
                let rest = sample.iter().copied().find(|i| !triple.contains(i))?;
                return Some((triple, rest));
            }
        }
        None
    }
}

impl Estimator for RigP3pEstimator {
    type Datum = RigDatum;
    type Model = Iso3;

    const MIN_SAMPLES: usize = RIG_MIN_SAMPLES;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Vec<Self::Model> {
        let Some((triple, check)) = Self::split_sample(data, sample_indices) else {
            return Vec::new();
        };
        let world: Vec<Pt3> = triple.iter().map(|&i| data[i].point).collect();
        let bearings: Vec<Vec3> = triple.iter().map(|&i| data[i].bearing).collect();
        let Ok(candidates) = p3p_bearings(&world, &bearings) else {
            return Vec::new();
        };

        let rig_from_cam = data[triple[0]].cam_from_rig.inverse();
        candidates
            .into_iter()
            .map(|cam_pose| rig_from_cam * cam_pose)
            .map(|rig_pose| (Self::residual(&rig_pose, &data[check]), rig_pose))
            .filter(|(err, _)| err.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, rig_pose)| rig_pose)
            .into_iter()
            .collect()
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        let pc = datum.cam_from_rig * model.transform_point(&datum.point);
        if pc.z <= MIN_DEPTH {
            return f64::INFINITY;
        }
        angle_between(&datum.bearing, &pc.coords)
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        Self::split_sample(data, sample_indices).is_none()
    }
}

/// Robust rig pose from the pooled correspondences of every camera.
///
/// `cameras[i]` and `intrinsics[i]` belong to camera `i` of `rig`. Fails when
/// fewer than four correspondences exist overall, when no camera holds the
/// three correspondences a hypothesis needs, or when RANSAC finds no
/// consensus.
pub fn resect_rig(
    cameras: &[CameraCorrespondences<'_>],
    intrinsics: &[CameraIntrinsics],
    rig: &RigGeometry,
    opts: &RigResectionOptions,
) -> Result<RigResection> {
    ensure!(
        cameras.len() == rig.num_cameras() && intrinsics.len() == rig.num_cameras(),
        "rig has {} cameras but got {} correspondence sets and {} intrinsics",
        rig.num_cameras(),
        cameras.len(),
        intrinsics.len()
    );

    let mut data = Vec::new();
    for (camera, (corr, intr)) in cameras.iter().zip(intrinsics.iter()).enumerate() {
        let Some(cam_from_rig) = rig.camera_from_rig(camera) else {
            bail!("camera {} has no subpose", camera);
        };
        for local_index in 0..corr.len() {
            data.push(RigDatum {
                camera,
                local_index,
                cam_from_rig,
                bearing: intr.bearing(&corr.points_2d[local_index]),
                point: corr.points_3d[local_index],
            });
        }
    }

    ensure!(
        data.len() >= RIG_MIN_SAMPLES,
        "need at least {} correspondences over the rig, got {}",
        RIG_MIN_SAMPLES,
        data.len()
    );
    ensure!(
        cameras.iter().any(|c| c.len() >= 3),
        "no camera observes the 3 correspondences a rig hypothesis needs"
    );

    let ransac_opts = RansacOptions {
        max_iters: opts.max_iters,
        thresh: opts.angular_threshold,
        min_inliers: RIG_MIN_SAMPLES,
        confidence: opts.confidence,
        seed: opts.seed,
        refit_on_inliers: false,
    };
    let res = ransac::<RigP3pEstimator>(&data, &ransac_opts);
    let Some(rig_pose) = res.model else {
        bail!(
            "no rig consensus under {:.4} deg after {} iterations",
            opts.angular_threshold.to_degrees(),
            res.iters
        );
    };

    let mut inliers = vec![Vec::new(); cameras.len()];
    for &i in &res.inliers {
        inliers[data[i].camera].push(data[i].local_index);
    }
    debug!(
        "rig resection: {}/{} inliers over {} cameras, rms {:.5} deg, {} iterations",
        res.inliers.len(),
        data.len(),
        inliers.iter().filter(|v| !v.is_empty()).count(),
        res.inlier_rms.to_degrees(),
        res.iters
    );

    Ok(RigResection {
        rig_pose,
        inliers,
        inlier_rms: res.inlier_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigloc_core::{pose_distance, synthetic, Pt2};

    #[test]
    fn split_sample_finds_camera_with_three_points() {
        let datum = |camera| RigDatum {
            camera,
            local_index: 0,
            cam_from_rig: Iso3::identity(),
            bearing: Vec3::z(),
            point: Pt3::origin(),
        };
        let data = vec![datum(1), datum(0), datum(1), datum(1), datum(0)];
        let (triple, rest) = RigP3pEstimator::split_sample(&data, &[4, 0, 2, 3]).unwrap();
        assert_eq!(triple, [0, 2, 3]);
        assert_eq!(rest, 4);
        assert!(RigP3pEstimator::split_sample(&data, &[0, 1, 2, 4]).is_none());
        let two_two = vec![datum(0), datum(0), datum(1), datum(1)];
        assert!(RigP3pEstimator::split_sample(&two_two, &[0, 1, 2, 3]).is_none());
    }

    #[test]
    fn rig_resection_uses_points_of_both_cameras() {
        let rig = synthetic::stereo_rig(0.3);
        let cam = synthetic::default_intrinsics();
        let rig_pose = synthetic::pose([0.05, -0.1, 0.02], [0.2, -0.1, 0.3]);

        let mut points_2d = Vec::new();
        let mut points_3d = Vec::new();
        for c in 0..2 {
            let pose = rig.camera_pose(&rig_pose, c).unwrap();
            let world = synthetic::visible_points(&cam, &pose, 3, 3, 2.0 + c as Real);
            points_2d.push(synthetic::project_all(&cam, &pose, &world).unwrap());
            points_3d.push(world);
        }
        // Gross outlier in camera 1.
        points_2d[1][4].x += 60.0;

        let cams: Vec<CameraCorrespondences> = (0..2)
            .map(|c| CameraCorrespondences::new(&points_2d[c], &points_3d[c]))
            .collect();
        let res = resect_rig(&cams, &[cam, cam], &rig, &RigResectionOptions::default()).unwrap();

        let (ang, dt) = pose_distance(&res.rig_pose, &rig_pose);
        assert!(ang < 1e-6 && dt < 1e-6, "rig pose error: {} rad, {} m", ang, dt);
        assert_eq!(res.inliers[0].len(), 9);
        assert_eq!(res.inliers[1].len(), 8);
        assert!(!res.inliers[1].contains(&4));
        assert_eq!(res.cameras_with_inliers(), 2);
    }

    #[test]
    fn rig_resection_needs_three_points_in_one_camera() {
        let rig = synthetic::stereo_rig(0.3);
        let cam = synthetic::default_intrinsics();
        let p2 = vec![Pt2::new(600.0, 300.0), Pt2::new(700.0, 400.0)];
        let p3 = vec![Pt3::new(0.0, 0.0, 2.0), Pt3::new(0.2, 0.1, 2.0)];
        let cams = [
            CameraCorrespondences::new(&p2, &p3),
            CameraCorrespondences::new(&p2, &p3),
        ];
        assert!(resect_rig(&cams, &[cam, cam], &rig, &RigResectionOptions::default()).is_err());
    }
}
