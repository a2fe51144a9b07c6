//! Geometric back-end of the localizer.

use crate::config::CommonParameters;
use anyhow::{bail, Result};
use rigloc_core::{
    CameraCorrespondences, CameraIntrinsics, FxFyCxCySkew, Iso3, Mat34, Pt2, Pt3, Real,
    RigGeometry,
};
use rigloc_linear::{
    resect_calibrated, resect_rig, resect_uncalibrated, ResectionOptions, RigResectionOptions,
    DLT_MIN_POINTS, P3P_MIN_POINTS, RIG_MIN_SAMPLES,
};
use rigloc_optim::{
    iterative_refine_rig_pose, refine_pose, refine_rig_pose, CameraViewObservations,
    PoseRefineOptions, RigRefineOptions, SolveOptions,
};

/// Robust single-camera resection.
#[derive(Debug, Clone)]
pub struct ResectionOutput {
    pub pose: Iso3,
    pub inliers: Vec<usize>,
    pub projection: Mat34,
    /// Intrinsics decomposed from `projection` when none were trusted.
    pub estimated_k: Option<FxFyCxCySkew<Real>>,
}

/// Robust multi-camera resection.
#[derive(Debug, Clone)]
pub struct RigResectionOutput {
    pub rig_pose: Iso3,
    /// Inliers per camera, in each camera's correspondence indexing.
    pub inliers: Vec<Vec<usize>>,
}

/// Resection and refinement primitives used by the localizer.
pub trait PoseSolver: Send + Sync {
    /// Minimal sample of [`resect`](Self::resect).
    fn min_points(&self, trusted_intrinsics: bool) -> usize;

    /// Fewest associations over a rig worth a joint resection.
    fn min_rig_points(&self) -> usize {
        RIG_MIN_SAMPLES
    }

    fn resect(
        &self,
        correspondences: CameraCorrespondences<'_>,
        intrinsics: Option<&CameraIntrinsics>,
        params: &CommonParameters,
    ) -> Result<ResectionOutput>;

    /// Refine `pose` (and intrinsics when requested) on inlier points.
    fn refine_pose(
        &self,
        points_3d: &[Pt3],
        points_2d: &[Pt2],
        pose: &Iso3,
        intrinsics: &CameraIntrinsics,
        params: &CommonParameters,
    ) -> Result<(Iso3, CameraIntrinsics)>;

    /// Whether [`resect_rig`](Self::resect_rig) and
    /// [`iterative_refine_rig`](Self::iterative_refine_rig) are available.
    fn supports_rig(&self) -> bool {
        false
    }

    fn resect_rig(
        &self,
        _cameras: &[CameraCorrespondences<'_>],
        _intrinsics: &[CameraIntrinsics],
        _rig: &RigGeometry,
        _params: &CommonParameters,
    ) -> Result<RigResectionOutput> {
        bail!("multi-camera resection is not supported by this solver")
    }

    /// Alternate rig refinement and inlier re-selection; returns the refined
    /// pose and the final per-camera inliers.
    fn iterative_refine_rig(
        &self,
        _cameras: &[CameraCorrespondences<'_>],
        _intrinsics: &[CameraIntrinsics],
        _rig: &RigGeometry,
        _rig_pose: &Iso3,
        _inliers: &[Vec<usize>],
        _params: &CommonParameters,
    ) -> Result<(Iso3, Vec<Vec<usize>>)> {
        bail!("multi-camera refinement is not supported by this solver")
    }

    /// Single refinement of a rig pose over fixed observations.
    fn refine_rig(
        &self,
        views: &[CameraViewObservations],
        rig_pose: &Iso3,
        params: &CommonParameters,
    ) -> Result<Iso3>;
}

/// [`PoseSolver`] on top of `rigloc-linear` and `rigloc-optim`.
#[derive(Debug, Clone, Default)]
pub struct DefaultPoseSolver {
    pub solve: SolveOptions,
}

impl DefaultPoseSolver {
    fn resection_options(params: &CommonParameters) -> ResectionOptions {
        ResectionOptions {
            error_max: params.reprojection_error_max,
            max_iters: params.ransac_max_iterations,
            seed: params.ransac_seed,
            ..ResectionOptions::default()
        }
    }
}

impl PoseSolver for DefaultPoseSolver {
    fn min_points(&self, trusted_intrinsics: bool) -> usize {
        if trusted_intrinsics {
            P3P_MIN_POINTS
        } else {
            DLT_MIN_POINTS
        }
    }

    fn resect(
        &self,
        correspondences: CameraCorrespondences<'_>,
        intrinsics: Option<&CameraIntrinsics>,
        params: &CommonParameters,
    ) -> Result<ResectionOutput> {
        let opts = Self::resection_options(params);
        let (world, image) = (correspondences.points_3d, correspondences.points_2d);
        let res = match intrinsics {
            Some(intr) => resect_calibrated(world, image, intr, &opts)?,
            None => resect_uncalibrated(world, image, &opts)?,
        };
        Ok(ResectionOutput {
            pose: res.pose,
            inliers: res.inliers,
            projection: res.projection,
            estimated_k: res.estimated_k,
        })
    }

    fn refine_pose(
        &self,
        points_3d: &[Pt3],
        points_2d: &[Pt2],
        pose: &Iso3,
        intrinsics: &CameraIntrinsics,
        params: &CommonParameters,
    ) -> Result<(Iso3, CameraIntrinsics)> {
        let opts = PoseRefineOptions {
            refine_intrinsics: params.refine_intrinsics,
            solve: self.solve,
        };
        let res = refine_pose(points_3d, points_2d, pose, &intrinsics.k, &opts)?;
        Ok((
            res.pose,
            CameraIntrinsics::new(res.k, intrinsics.width, intrinsics.height),
        ))
    }

    fn supports_rig(&self) -> bool {
        true
    }

    fn resect_rig(
        &self,
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        params: &CommonParameters,
    ) -> Result<RigResectionOutput> {
        let opts = RigResectionOptions {
            angular_threshold: params.angular_threshold_rad(),
            max_iters: params.ransac_max_iterations,
            seed: params.ransac_seed,
            ..RigResectionOptions::default()
        };
        let res = resect_rig(cameras, intrinsics, rig, &opts)?;
        Ok(RigResectionOutput {
            rig_pose: res.rig_pose,
            inliers: res.inliers,
        })
    }

    fn iterative_refine_rig(
        &self,
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        rig_pose: &Iso3,
        inliers: &[Vec<usize>],
        params: &CommonParameters,
    ) -> Result<(Iso3, Vec<Vec<usize>>)> {
        let opts = RigRefineOptions {
            error_max: params.reprojection_error_max,
            max_iterations: params.rig_refine_max_iterations,
            min_points: params.rig_min_points,
            solve: self.solve,
        };
        let res = iterative_refine_rig_pose(cameras, intrinsics, rig, rig_pose, inliers, &opts)?;
        Ok((res.rig_pose, res.inliers))
    }

    fn refine_rig(
        &self,
        views: &[CameraViewObservations],
        rig_pose: &Iso3,
        _params: &CommonParameters,
    ) -> Result<Iso3> {
        let (pose, _) = refine_rig_pose(views, rig_pose, &self.solve)?;
        Ok(pose)
    }
}
