//! Rig pose refinement with fixed subposes and fixed intrinsics.
//!
//! The only parameter block is the rig pose `T_C0_W`; camera `i` projects
//! through `subpose_i * rig_pose`.

use crate::math::projection::project_pinhole;
use crate::math::{constant, constant_point, transform_constant};
use crate::params::pose::{pack_pose, transform_generic, unpack_pose, POSE_DIM};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use anyhow::{anyhow, ensure, Result};
use log::debug;
use nalgebra::{DMatrix, DVector, RealField, SVector, Vector2};
use num_dual::{jacobian, DualSVec64};
use rigloc_core::{
    CameraCorrespondences, CameraIntrinsics, FxFyCxCySkew, Iso3, Pt2, Pt3, Real, RigGeometry,
};

/// Observations of one rig camera used by the refinement.
#[derive(Debug, Clone)]
pub struct CameraViewObservations {
    /// `T_Ci_C0`.
    pub cam_from_rig: Iso3,
    pub k: FxFyCxCySkew<Real>,
    pub points_3d: Vec<Pt3>,
    pub points_2d: Vec<Pt2>,
}

impl CameraViewObservations {
    /// Gather the selected correspondences of every rig camera.
    ///
    /// `selection[i]` indexes into `cameras[i]`.
    pub fn from_selection(
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        selection: &[Vec<usize>],
    ) -> Result<Vec<Self>> {
        ensure!(
            cameras.len() == rig.num_cameras()
                && intrinsics.len() == rig.num_cameras()
                && selection.len() == rig.num_cameras(),
            "rig has {} cameras but got {} correspondence sets, {} intrinsics, {} selections",
            rig.num_cameras(),
            cameras.len(),
            intrinsics.len(),
            selection.len()
        );
        let mut views = Vec::with_capacity(cameras.len());
        for (cam, (corr, indices)) in cameras.iter().zip(selection).enumerate() {
            let cam_from_rig = rig
                .camera_from_rig(cam)
                .ok_or_else(|| anyhow!("camera {} has no subpose", cam))?;
            ensure!(
                indices.iter().all(|&i| i < corr.len()),
                "selection of camera {} is out of range",
                cam
            );
            views.push(Self {
                cam_from_rig,
                k: intrinsics[cam].k,
                points_3d: indices.iter().map(|&i| corr.points_3d[i]).collect(),
                points_2d: indices.iter().map(|&i| corr.points_2d[i]).collect(),
            });
        }
        Ok(views)
    }

    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

fn view_residual<T: RealField>(
    pose: &[T],
    view: &CameraViewObservations,
    pw: &Pt3,
    uv: &Pt2,
) -> Vector2<T> {
    let p_rig = transform_generic(pose, &constant_point(pw));
    let pc = transform_constant(&view.cam_from_rig, &p_rig);
    let proj = project_pinhole(
        constant::<T>(view.k.fx),
        constant::<T>(view.k.fy),
        constant::<T>(view.k.cx),
        constant::<T>(view.k.cy),
        constant::<T>(view.k.skew),
        &pc,
    );
    Vector2::new(
        constant::<T>(uv.x) - proj.x.clone(),
        constant::<T>(uv.y) - proj.y.clone(),
    )
}

#[derive(Debug, Clone)]
pub struct RigPoseProblem<'a> {
    views: &'a [CameraViewObservations],
}

impl<'a> RigPoseProblem<'a> {
    pub fn new(views: &'a [CameraViewObservations]) -> Self {
        Self { views }
    }

    fn observations(
        &self,
    ) -> impl Iterator<Item = (&'a CameraViewObservations, &'a Pt3, &'a Pt2)> + 'a {
        let views = self.views;
        views.iter().flat_map(|view| {
            view.points_3d
                .iter()
                .zip(view.points_2d.iter())
                .map(move |(pw, uv)| (view, pw, uv))
        })
    }
}

impl NllsProblem for RigPoseProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_DIM
    }

    fn num_residuals(&self) -> usize {
        2 * self.views.iter().map(CameraViewObservations::len).sum::<usize>()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = DVector::zeros(self.num_residuals());
        for (i, (view, pw, uv)) in self.observations().enumerate() {
            let ri = view_residual(x.as_slice(), view, pw, uv);
            r[2 * i] = ri.x;
            r[2 * i + 1] = ri.y;
        }
        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let p0 = SVector::<Real, POSE_DIM>::from_column_slice(&x.as_slice()[..POSE_DIM]);
        let mut j = DMatrix::zeros(self.num_residuals(), POSE_DIM);
        for (i, (view, pw, uv)) in self.observations().enumerate() {
            let (_, j_point) = jacobian(
                |p: SVector<DualSVec64<POSE_DIM>, POSE_DIM>| {
                    view_residual(p.as_slice(), view, pw, uv)
                },
                p0,
            );
            j.view_mut((2 * i, 0), (2, POSE_DIM)).copy_from(&j_point);
        }
        j
    }
}

/// Refine the rig pose over the given views.
pub fn refine_rig_pose(
    views: &[CameraViewObservations],
    initial_pose: &Iso3,
    opts: &SolveOptions,
) -> Result<(Iso3, SolveReport)> {
    let problem = RigPoseProblem::new(views);
    ensure!(
        problem.num_residuals() >= POSE_DIM,
        "{} observations cannot constrain a rig pose",
        problem.num_residuals() / 2
    );
    let mut x0 = DVector::zeros(POSE_DIM);
    pack_pose(initial_pose, x0.as_mut_slice());
    let (x, report) = LmBackend.solve(&problem, x0, opts);
    ensure!(
        report.is_usable(),
        "rig pose refinement failed: {} (cost {:.3e} -> {:.3e})",
        report.termination,
        report.initial_cost,
        report.final_cost
    );
    Ok((unpack_pose(x.as_slice())?, report))
}

#[derive(Debug, Clone)]
pub struct RigRefineOptions {
    /// Pixel threshold used to recompute inliers after each round.
    pub error_max: Real,
    /// Maximum number of refine/re-select rounds.
    pub max_iterations: usize,
    /// Fewer inliers than this over the rig is a failure.
    pub min_points: usize,
    pub solve: SolveOptions,
}

impl Default for RigRefineOptions {
    fn default() -> Self {
        Self {
            error_max: 4.0,
            max_iterations: 10,
            min_points: 4,
            solve: SolveOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RigRefineResult {
    pub rig_pose: Iso3,
    /// Per camera, indices of the final inliers.
    pub inliers: Vec<Vec<usize>>,
    /// Number of refinement rounds performed.
    pub rounds: usize,
    /// RMS reprojection error over the final inliers, in pixels.
    pub rms: Real,
    pub report: SolveReport,
}

fn select_inliers(
    cameras: &[CameraCorrespondences<'_>],
    intrinsics: &[CameraIntrinsics],
    rig: &RigGeometry,
    rig_pose: &Iso3,
    error_max: Real,
) -> Result<(Vec<Vec<usize>>, Real)> {
    let mut inliers = Vec::with_capacity(cameras.len());
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for (cam, (corr, intr)) in cameras.iter().zip(intrinsics).enumerate() {
        let pose = rig
            .camera_pose(rig_pose, cam)
            .ok_or_else(|| anyhow!("camera {} has no subpose", cam))?;
        let mut selected = Vec::new();
        for i in 0..corr.len() {
            let err = intr.reprojection_error(&pose, &corr.points_3d[i], &corr.points_2d[i]);
            if err <= error_max {
                selected.push(i);
                sum_sq += err * err;
                count += 1;
            }
        }
        inliers.push(selected);
    }
    let rms = if count > 0 {
        (sum_sq / count as Real).sqrt()
    } else {
        Real::INFINITY
    };
    Ok((inliers, rms))
}

fn total(inliers: &[Vec<usize>]) -> usize {
    inliers.iter().map(Vec::len).sum()
}

/// Alternate rig pose refinement and inlier re-selection.
///
/// Each round refines on the current inliers, then recomputes them under
/// `error_max`. Stops when the inlier count no longer changes or after
/// `max_iterations` rounds; fails as soon as fewer than `min_points`
/// inliers remain.
pub fn iterative_refine_rig_pose(
    cameras: &[CameraCorrespondences<'_>],
    intrinsics: &[CameraIntrinsics],
    rig: &RigGeometry,
    initial_pose: &Iso3,
    initial_inliers: &[Vec<usize>],
    opts: &RigRefineOptions,
) -> Result<RigRefineResult> {
    let mut inliers = initial_inliers.to_vec();
    let mut rig_pose = *initial_pose;
    let mut last_report = None;
    let mut rms = Real::INFINITY;
    let mut rounds = 0;

    while rounds < opts.max_iterations.max(1) {
        ensure!(
            total(&inliers) >= opts.min_points,
            "only {} rig inliers left, need {}",
            total(&inliers),
            opts.min_points
        );
        let views = CameraViewObservations::from_selection(cameras, intrinsics, rig, &inliers)?;
        let (pose, report) = refine_rig_pose(&views, &rig_pose, &opts.solve)?;
        rounds += 1;
        rig_pose = pose;
        last_report = Some(report);

        let (next, next_rms) = select_inliers(cameras, intrinsics, rig, &rig_pose, opts.error_max)?;
        let unchanged = total(&next) == total(&inliers);
        debug!(
            "rig refinement round {}: {} -> {} inliers, rms {:.4} px",
            rounds,
            total(&inliers),
            total(&next),
            next_rms
        );
        inliers = next;
        rms = next_rms;
        if unchanged {
            break;
        }
    }

    ensure!(
        total(&inliers) >= opts.min_points,
        "only {} rig inliers left, need {}",
        total(&inliers),
        opts.min_points
    );
    let report = last_report.ok_or_else(|| anyhow!("rig refinement did not run"))?;
    Ok(RigRefineResult {
        rig_pose,
        inliers,
        rounds,
        rms,
        report,
    })
}
