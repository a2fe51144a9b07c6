//! Single-camera pose refinement, optionally including the pinhole
//! parameters `fx, fy, cx, cy` (skew stays fixed).
//!
//! Parameter vector: `[wx, wy, wz, tx, ty, tz]` followed by
//! `[fx, fy, cx, cy]` when intrinsics are refined.

use crate::math::projection::project_pinhole;
use crate::math::{constant, constant_point};
use crate::params::pose::{pack_pose, transform_generic, unpack_pose, POSE_DIM};
use crate::{LmBackend, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use anyhow::{ensure, Result};
use log::debug;
use nalgebra::{DMatrix, DVector, RealField, SVector, Vector2};
use num_dual::{jacobian, DualSVec64};
use rigloc_core::{FxFyCxCySkew, Iso3, Pt2, Pt3, Real};

pub const INTRINSICS_DIM: usize = 4;
const LOCAL_DIM: usize = POSE_DIM + INTRINSICS_DIM;

/// Residual `observed - projected` of one correspondence.
///
/// `local` holds the pose block followed by `fx, fy, cx, cy`.
fn point_residual<T: RealField>(local: &[T], skew: T, pw: &Pt3, uv: &Pt2) -> Vector2<T> {
    let pc = transform_generic(&local[..POSE_DIM], &constant_point(pw));
    let proj = project_pinhole(
        local[POSE_DIM].clone(),
        local[POSE_DIM + 1].clone(),
        local[POSE_DIM + 2].clone(),
        local[POSE_DIM + 3].clone(),
        skew,
        &pc,
    );
    Vector2::new(
        constant::<T>(uv.x) - proj.x.clone(),
        constant::<T>(uv.y) - proj.y.clone(),
    )
}

/// Reprojection problem over a single camera.
#[derive(Debug, Clone)]
pub struct PoseRefineProblem<'a> {
    points_3d: &'a [Pt3],
    points_2d: &'a [Pt2],
    k: FxFyCxCySkew<Real>,
    refine_intrinsics: bool,
}

impl<'a> PoseRefineProblem<'a> {
    pub fn new(
        points_3d: &'a [Pt3],
        points_2d: &'a [Pt2],
        k: FxFyCxCySkew<Real>,
        refine_intrinsics: bool,
    ) -> Self {
        Self {
            points_3d,
            points_2d,
            k,
            refine_intrinsics,
        }
    }

    pub fn pack(&self, pose: &Iso3) -> DVector<Real> {
        let mut x = DVector::zeros(self.num_params());
        pack_pose(pose, x.as_mut_slice());
        if self.refine_intrinsics {
            x[POSE_DIM] = self.k.fx;
            x[POSE_DIM + 1] = self.k.fy;
            x[POSE_DIM + 2] = self.k.cx;
            x[POSE_DIM + 3] = self.k.cy;
        }
        x
    }

    pub fn unpack(&self, x: &DVector<Real>) -> Result<(Iso3, FxFyCxCySkew<Real>)> {
        let pose = unpack_pose(x.as_slice())?;
        let local = self.local_params(x);
        let k = FxFyCxCySkew {
            fx: local[POSE_DIM],
            fy: local[POSE_DIM + 1],
            cx: local[POSE_DIM + 2],
            cy: local[POSE_DIM + 3],
            skew: self.k.skew,
        };
        ensure!(
            k.fx.is_finite() && k.fy.is_finite() && k.fx > 0.0 && k.fy > 0.0,
            "refined focal lengths are invalid: ({}, {})",
            k.fx,
            k.fy
        );
        ensure!(
            k.cx.is_finite() && k.cy.is_finite(),
            "refined principal point is not finite"
        );
        Ok((pose, k))
    }

    fn local_params(&self, x: &DVector<Real>) -> SVector<Real, LOCAL_DIM> {
        let mut local = SVector::<Real, LOCAL_DIM>::zeros();
        local.as_mut_slice()[..POSE_DIM].copy_from_slice(&x.as_slice()[..POSE_DIM]);
        if self.refine_intrinsics {
            for i in 0..INTRINSICS_DIM {
                local[POSE_DIM + i] = x[POSE_DIM + i];
            }
        } else {
            local[POSE_DIM] = self.k.fx;
            local[POSE_DIM + 1] = self.k.fy;
            local[POSE_DIM + 2] = self.k.cx;
            local[POSE_DIM + 3] = self.k.cy;
        }
        local
    }
}

impl NllsProblem for PoseRefineProblem<'_> {
    fn num_params(&self) -> usize {
        if self.refine_intrinsics {
            LOCAL_DIM
        } else {
            POSE_DIM
        }
    }

    fn num_residuals(&self) -> usize {
        2 * self.points_3d.len()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let local = self.local_params(x);
        let mut r = DVector::zeros(self.num_residuals());
        for (i, (pw, uv)) in self.points_3d.iter().zip(self.points_2d).enumerate() {
            let ri = point_residual(local.as_slice(), self.k.skew, pw, uv);
            r[2 * i] = ri.x;
            r[2 * i + 1] = ri.y;
        }
        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let local0 = self.local_params(x);
        let ncols = self.num_params();
        let mut j = DMatrix::zeros(self.num_residuals(), ncols);
        let skew = self.k.skew;
        for (i, (pw, uv)) in self.points_3d.iter().zip(self.points_2d).enumerate() {
            let (_, j_point) = jacobian(
                |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
                    point_residual(p.as_slice(), constant(skew), pw, uv)
                },
                local0,
            );
            for r in 0..2 {
                for c in 0..ncols {
                    j[(2 * i + r, c)] = j_point[(r, c)];
                }
            }
        }
        j
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoseRefineOptions {
    /// Also refine `fx, fy, cx, cy`.
    pub refine_intrinsics: bool,
    pub solve: SolveOptions,
}

#[derive(Debug, Clone)]
pub struct PoseRefineResult {
    pub pose: Iso3,
    /// Refined intrinsics; equal to the input when they were held fixed.
    pub k: FxFyCxCySkew<Real>,
    /// RMS reprojection error (per point, in pixels) after refinement.
    pub rms: Real,
    pub report: SolveReport,
}

/// Minimise the reprojection error of `points_3d` against `points_2d`.
///
/// Fails when there are fewer correspondences than parameters allow, when
/// the solver diverges, or when the result is not a valid camera.
pub fn refine_pose(
    points_3d: &[Pt3],
    points_2d: &[Pt2],
    initial_pose: &Iso3,
    k: &FxFyCxCySkew<Real>,
    opts: &PoseRefineOptions,
) -> Result<PoseRefineResult> {
    ensure!(
        points_3d.len() == points_2d.len(),
        "mismatched number of world points ({}) and image points ({})",
        points_3d.len(),
        points_2d.len()
    );
    let problem = PoseRefineProblem::new(points_3d, points_2d, *k, opts.refine_intrinsics);
    ensure!(
        problem.num_residuals() >= problem.num_params(),
        "{} correspondences cannot constrain {} parameters",
        points_3d.len(),
        problem.num_params()
    );

    let x0 = problem.pack(initial_pose);
    let (x, report) = LmBackend.solve(&problem, x0, &opts.solve);
    ensure!(
        report.is_usable(),
        "pose refinement failed: {} (cost {:.3e} -> {:.3e})",
        report.termination,
        report.initial_cost,
        report.final_cost
    );
    let (pose, k) = problem.unpack(&x)?;
    let rms = (2.0 * report.final_cost / points_3d.len() as Real).sqrt();
    debug!(
        "pose refinement over {} points: rms {:.4} px, {} evaluations",
        points_3d.len(),
        rms,
        report.iterations
    );

    Ok(PoseRefineResult {
        pose,
        k,
        rms,
        report,
    })
}
