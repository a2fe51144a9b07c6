//! Localization outcomes.

use crate::harvest::{AssociationKey, CorrespondenceSet, KeyframeMatch};
use rigloc_core::{CameraIntrinsics, Iso3, Mat34, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Where a localization attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalizationStatus {
    Localized,
    /// Too few associations to attempt a resection.
    InsufficientData,
    /// The robust resection found no consensus.
    ResectionFailed,
    /// The resection succeeded but the non-linear refinement did not; the
    /// resection pose is kept.
    RefinementFailed,
}

/// Reprojection error statistics over the inliers, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorStats {
    pub rmse: Real,
    pub min: Real,
    pub max: Real,
}

/// Outcome of localizing one camera.
///
/// When [`is_valid`](Self::is_valid) is false the pose and inliers are
/// best-effort data and may be placeholders.
#[derive(Debug, Clone)]
pub struct LocalizationResult {
    status: LocalizationStatus,
    pose: Iso3,
    intrinsics: CameraIntrinsics,
    correspondences: CorrespondenceSet,
    inliers: Vec<usize>,
    matched_keyframes: Vec<KeyframeMatch>,
    error_max: Real,
}

impl LocalizationResult {
    pub(crate) fn new(
        status: LocalizationStatus,
        pose: Iso3,
        intrinsics: CameraIntrinsics,
        correspondences: CorrespondenceSet,
        inliers: Vec<usize>,
        matched_keyframes: Vec<KeyframeMatch>,
        error_max: Real,
    ) -> Self {
        Self {
            status,
            pose,
            intrinsics,
            correspondences,
            inliers,
            matched_keyframes,
            error_max,
        }
    }

    /// Same result seen from another pose.
    pub(crate) fn with_pose(mut self, pose: Iso3) -> Self {
        self.pose = pose;
        self
    }

    pub fn status(&self) -> LocalizationStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == LocalizationStatus::Localized
    }

    /// Camera pose `T_C_W`.
    pub fn pose(&self) -> &Iso3 {
        &self.pose
    }

    /// Intrinsics used for the pose; estimated when none were supplied.
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// `K [R | t]`.
    pub fn projection(&self) -> Mat34 {
        self.intrinsics.projection_matrix(&self.pose)
    }

    pub fn correspondences(&self) -> &CorrespondenceSet {
        &self.correspondences
    }

    pub fn association_keys(&self) -> &[AssociationKey] {
        &self.correspondences.keys
    }

    /// Indices of the inlier correspondences.
    pub fn inliers(&self) -> &[usize] {
        &self.inliers
    }

    pub fn inlier_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.correspondences.len()];
        for &i in &self.inliers {
            if let Some(m) = mask.get_mut(i) {
                *m = true;
            }
        }
        mask
    }

    pub fn matched_keyframes(&self) -> &[KeyframeMatch] {
        &self.matched_keyframes
    }

    /// Reprojection threshold the inliers were selected with.
    pub fn error_max(&self) -> Real {
        self.error_max
    }

    /// `observed - projected` for every inlier; points behind the camera are
    /// skipped.
    pub fn inlier_residuals(&self) -> Vec<Vec2> {
        self.inliers
            .iter()
            .filter(|&&i| i < self.correspondences.len())
            .filter_map(|&i| {
                let pc = self.pose.transform_point(&self.correspondences.points_3d[i]);
                let uv = self.intrinsics.project(&pc)?;
                Some(self.correspondences.points_2d[i] - uv)
            })
            .collect()
    }

    pub fn inlier_error_stats(&self) -> Option<ErrorStats> {
        error_stats(self.inlier_residuals().iter().map(|r| r.norm()))
    }
}

pub(crate) fn error_stats(errors: impl Iterator<Item = Real>) -> Option<ErrorStats> {
    let mut count = 0usize;
    let mut sum_sq = 0.0;
    let mut min = Real::INFINITY;
    let mut max = 0.0 as Real;
    for e in errors {
        count += 1;
        sum_sq += e * e;
        min = min.min(e);
        max = max.max(e);
    }
    (count > 0).then(|| ErrorStats {
        rmse: (sum_sq / count as Real).sqrt(),
        min,
        max,
    })
}

/// How the rig pose was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionStrategy {
    /// Joint multi-camera resection and iterative refinement.
    Global,
    /// Per-camera localization composed through the subposes.
    Naive,
}

/// Outcome of localizing a rig.
#[derive(Debug, Clone)]
pub struct RigLocalization {
    pub status: LocalizationStatus,
    /// Rig pose `T_C0_W`; present once a resection succeeded.
    pub rig_pose: Option<Iso3>,
    pub strategy: FusionStrategy,
    /// One result per camera, in camera order.
    pub results: Vec<LocalizationResult>,
    /// Associations harvested over all cameras.
    pub num_associations: usize,
}

impl RigLocalization {
    pub fn is_valid(&self) -> bool {
        self.status == LocalizationStatus::Localized
    }

    pub fn num_localized(&self) -> usize {
        self.results.iter().filter(|r| r.is_valid()).count()
    }
}
