//! Robust single-camera resection.
//!
//! Two estimators run inside [`rigloc_core::ransac`]:
//! - with trusted intrinsics, P3P on three correspondences with a fourth one
//!   picking among the candidate poses;
//! - without intrinsics, a normalized DLT of the full camera matrix on six
//!   correspondences, refitted on the consensus set.
//!
//! Both score correspondences by pixel reprojection error.

use crate::camera_matrix::{decompose_camera_matrix, dlt_camera_matrix, DLT_MIN_POINTS};
use crate::pnp::p3p;
use anyhow::{anyhow, bail, ensure, Result};
use log::debug;
use rigloc_core::{
    project_with_matrix, ransac, CameraIntrinsics, Estimator, FxFyCxCySkew, Iso3, Mat34, Pt2,
    Pt3, RansacOptions, Real,
};

/// Minimal sample of the calibrated (P3P + 1) estimator.
pub const P3P_MIN_POINTS: usize = 4;

/// Options shared by the single-camera resection entry points.
#[derive(Debug, Clone)]
pub struct ResectionOptions {
    /// Inlier threshold on the reprojection error, in pixels.
    pub error_max: Real,
    /// Maximum number of RANSAC iterations.
    pub max_iters: usize,
    /// RANSAC early-termination confidence.
    pub confidence: Real,
    /// RNG seed.
    pub seed: u64,
}

impl Default for ResectionOptions {
    fn default() -> Self {
        Self {
            error_max: 4.0,
            max_iters: 1024,
            confidence: 0.999,
            seed: 1_234_567,
        }
    }
}

impl ResectionOptions {
    fn ransac(&self, min_samples: usize, refit: bool) -> RansacOptions {
        RansacOptions {
            max_iters: self.max_iters,
            thresh: self.error_max,
            min_inliers: min_samples,
            confidence: self.confidence,
            seed: self.seed,
            refit_on_inliers: refit,
        }
    }
}

/// Outcome of a successful resection.
#[derive(Debug, Clone)]
pub struct Resection {
    /// Camera pose `T_C_W`.
    pub pose: Iso3,
    /// Camera matrix `P = K [R | t]` consistent with `pose`.
    pub projection: Mat34,
    /// Indices of the consensus correspondences, ascending.
    pub inliers: Vec<usize>,
    /// RMS reprojection error over the inliers, in pixels.
    pub inlier_rms: Real,
    /// Intrinsics recovered from the camera matrix (uncalibrated case only).
    pub estimated_k: Option<FxFyCxCySkew<Real>>,
}

#[derive(Debug, Clone)]
struct CalibratedDatum {
    pw: Pt3,
    pi: Pt2,
    intrinsics: CameraIntrinsics,
}

struct P3pEstimator;

impl Estimator for P3pEstimator {
    type Datum = CalibratedDatum;
    type Model = Iso3;

    const MIN_SAMPLES: usize = P3P_MIN_POINTS;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Vec<Self::Model> {
        let world: Vec<Pt3> = sample_indices[..3].iter().map(|&i| data[i].pw).collect();
        let image: Vec<Pt2> = sample_indices[..3].iter().map(|&i| data[i].pi).collect();
        let Ok(candidates) = p3p(&world, &image, &data[sample_indices[0]].intrinsics) else {
            return Vec::new();
        };
        let check = &data[sample_indices[3]];
        candidates
            .into_iter()
            .map(|pose| (Self::residual(&pose, check), pose))
            .filter(|(err, _)| err.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, pose)| pose)
            .into_iter()
            .collect()
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        datum
            .intrinsics
            .reprojection_error(model, &datum.pw, &datum.pi)
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        let p = |k: usize| data[sample_indices[k]].pw;
        (p(1) - p(0)).cross(&(p(2) - p(0))).norm() < 1e-12
    }
}

#[derive(Debug, Clone)]
struct UncalibratedDatum {
    pw: Pt3,
    pi: Pt2,
}

struct CameraMatrixEstimator;

impl CameraMatrixEstimator {
    fn solve(data: &[UncalibratedDatum], indices: &[usize]) -> Option<Mat34> {
        let world: Vec<Pt3> = indices.iter().map(|&i| data[i].pw).collect();
        let image: Vec<Pt2> = indices.iter().map(|&i| data[i].pi).collect();
        dlt_camera_matrix(&world, &image).ok()
    }
}

impl Estimator for CameraMatrixEstimator {
    type Datum = UncalibratedDatum;
    type Model = Mat34;

    const MIN_SAMPLES: usize = DLT_MIN_POINTS;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Vec<Self::Model> {
        Self::solve(data, sample_indices).into_iter().collect()
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        project_with_matrix(model, &datum.pw)
            .map(|uv| (uv - datum.pi).norm())
            .unwrap_or(f64::INFINITY)
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        Self::solve(data, inliers)
    }
}

fn check_input(world: &[Pt3], image: &[Pt2], min_points: usize) -> Result<()> {
    ensure!(
        world.len() == image.len(),
        "mismatched number of world points ({}) and image points ({})",
        world.len(),
        image.len()
    );
    ensure!(
        world.len() >= min_points,
        "need at least {} point correspondences, got {}",
        min_points,
        world.len()
    );
    Ok(())
}

/// Robust resection with trusted intrinsics (P3P inside RANSAC).
pub fn resect_calibrated(
    world: &[Pt3],
    image: &[Pt2],
    intrinsics: &CameraIntrinsics,
    opts: &ResectionOptions,
) -> Result<Resection> {
    check_input(world, image, P3P_MIN_POINTS)?;

    let data: Vec<CalibratedDatum> = world
        .iter()
        .zip(image.iter())
        .map(|(&pw, &pi)| CalibratedDatum {
            pw,
            pi,
            intrinsics: *intrinsics,
        })
        .collect();

    let res = ransac::<P3pEstimator>(&data, &opts.ransac(P3P_MIN_POINTS, false));
    let Some(pose) = res.model else {
        bail!(
            "no P3P consensus under {:.2} px after {} iterations",
            opts.error_max,
            res.iters
        );
    };
    debug!(
        "P3P resection: {}/{} inliers, rms {:.4} px, {} iterations",
        res.inliers.len(),
        data.len(),
        res.inlier_rms,
        res.iters
    );

    Ok(Resection {
        pose,
        projection: intrinsics.projection_matrix(&pose),
        inliers: res.inliers,
        inlier_rms: res.inlier_rms,
        estimated_k: None,
    })
}

/// Robust resection without intrinsics (camera-matrix DLT inside RANSAC).
///
/// The consensus camera matrix is decomposed into `K`, `R`, `t`; the pose
/// and the recovered `K` are returned alongside `P`.
pub fn resect_uncalibrated(
    world: &[Pt3],
    image: &[Pt2],
    opts: &ResectionOptions,
) -> Result<Resection> {
    check_input(world, image, DLT_MIN_POINTS)?;

    let data: Vec<UncalibratedDatum> = world
        .iter()
        .zip(image.iter())
        .map(|(&pw, &pi)| UncalibratedDatum { pw, pi })
        .collect();

    let res = ransac::<CameraMatrixEstimator>(&data, &opts.ransac(DLT_MIN_POINTS, true));
    let Some(projection) = res.model else {
        bail!(
            "no camera matrix consensus under {:.2} px after {} iterations",
            opts.error_max,
            res.iters
        );
    };
    let decomposition = decompose_camera_matrix(&projection)?;
    let k = decomposition
        .intrinsics()
        .ok_or_else(|| anyhow!("camera matrix yields invalid intrinsics"))?;
    debug!(
        "DLT resection: {}/{} inliers, rms {:.4} px, f = ({:.1}, {:.1})",
        res.inliers.len(),
        data.len(),
        res.inlier_rms,
        k.fx,
        k.fy
    );

    Ok(Resection {
        pose: decomposition.pose(),
        projection,
        inliers: res.inliers,
        inlier_rms: res.inlier_rms,
        estimated_k: Some(k),
    })
}
