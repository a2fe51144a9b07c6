//! Marker localizer front-end: single images and rigs.

use crate::config::{CommonParameters, LocalizerParameters, MarkerParameters};
use crate::database::AssociationDatabase;
use crate::describer::{MarkerDescriber, MarkerRegions};
use crate::error::{config_error, Result};
use crate::harvest::{harvest_associations, Harvest};
use crate::result::{
    error_stats, FusionStrategy, LocalizationResult, LocalizationStatus, RigLocalization,
};
use crate::solver::{DefaultPoseSolver, PoseSolver};
use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;
use rigloc_core::{
    CameraCorrespondences, CameraIntrinsics, FxFyCxCySkew, Iso3, Real, RigGeometry,
};
use rigloc_optim::CameraViewObservations;

/// Image width and height in pixels.
pub type ImageSize = (u32, u32);

/// Intrinsics reported when none were supplied or estimated.
fn placeholder_intrinsics((width, height): ImageSize) -> CameraIntrinsics {
    let f = width.max(height).max(1) as Real;
    let k = FxFyCxCySkew {
        fx: f,
        fy: f,
        cx: width as Real / 2.0,
        cy: height as Real / 2.0,
        skew: 0.0,
    };
    CameraIntrinsics::new(k, width, height)
}

fn failed_result(
    status: LocalizationStatus,
    harvest: Harvest,
    intrinsics: CameraIntrinsics,
    error_max: Real,
) -> LocalizationResult {
    LocalizationResult::new(
        status,
        Iso3::identity(),
        intrinsics,
        harvest.correspondences,
        Vec::new(),
        harvest.matched_keyframes,
        error_max,
    )
}

fn log_stats(label: &str, result: &LocalizationResult) {
    if let Some(stats) = result.inlier_error_stats() {
        debug!(
            "{}: {} inliers, RMSE = {:.4} min = {:.4} max = {:.4}",
            label,
            result.inliers().len(),
            stats.rmse,
            stats.min,
            stats.max
        );
    }
}

/// Per-camera inlier RMSE of a rig pose.
fn log_rig_stats(
    label: &str,
    cameras: &[CameraCorrespondences<'_>],
    intrinsics: &[CameraIntrinsics],
    rig: &RigGeometry,
    rig_pose: &Iso3,
    inliers: &[Vec<usize>],
) {
    for (cam, (corr, intr)) in cameras.iter().zip(intrinsics).enumerate() {
        let (Some(pose), Some(idx)) = (rig.camera_pose(rig_pose, cam), inliers.get(cam)) else {
            continue;
        };
        let errors = idx
            .iter()
            .filter(|&&i| i < corr.len())
            .map(|&i| intr.reprojection_error(&pose, &corr.points_3d[i], &corr.points_2d[i]));
        if let Some(stats) = error_stats(errors) {
            debug!(
                "{}: camera {} {} inliers, RMSE = {:.4} min = {:.4} max = {:.4}",
                label,
                cam,
                idx.len(),
                stats.rmse,
                stats.min,
                stats.max
            );
        }
    }
}

/// Localizes cameras and rigs against an [`AssociationDatabase`] of
/// reconstructed markers.
pub struct MarkerLocalizer<D, S = DefaultPoseSolver> {
    database: AssociationDatabase,
    describer: D,
    solver: S,
    device_pipe: usize,
}

impl<D: MarkerDescriber> MarkerLocalizer<D, DefaultPoseSolver> {
    pub fn new(database: AssociationDatabase, describer: D) -> Self {
        Self::with_solver(database, describer, DefaultPoseSolver::default())
    }
}

impl<D: MarkerDescriber, S: PoseSolver> MarkerLocalizer<D, S> {
    pub fn with_solver(database: AssociationDatabase, describer: D, solver: S) -> Self {
        Self {
            database,
            describer,
            solver,
            device_pipe: 0,
        }
    }

    pub fn database(&self) -> &AssociationDatabase {
        &self.database
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Device the marker detector runs on.
    pub fn set_device_pipe(&mut self, index: usize) {
        self.device_pipe = index;
    }

    pub fn device_pipe(&self) -> usize {
        self.device_pipe
    }

    fn describe(&self, image: &GrayImage, params: &CommonParameters) -> Result<MarkerRegions> {
        let regions = self
            .describer
            .describe(image, params.feature_preset, self.device_pipe)?;
        debug!(
            "described {}x{} image: {} markers",
            image.width(),
            image.height(),
            regions.len()
        );
        Ok(regions)
    }

    fn check_describer(&self) -> Result<()> {
        let describer = self.describer.describer_type();
        if describer != self.database.describer_type() {
            return Err(config_error(format!(
                "describer produces {} markers but the database holds {}",
                describer,
                self.database.describer_type()
            )));
        }
        Ok(())
    }

    fn check_regions(&self, regions: &MarkerRegions) -> Result<()> {
        if regions.describer != self.database.describer_type() {
            return Err(config_error(format!(
                "query described with {} but the database holds {}",
                regions.describer,
                self.database.describer_type()
            )));
        }
        Ok(())
    }

    /// Describe `image` and localize it.
    pub fn localize_image(
        &self,
        image: &GrayImage,
        params: &LocalizerParameters,
        intrinsics: Option<&CameraIntrinsics>,
    ) -> Result<LocalizationResult> {
        let marker = params.marker()?;
        self.check_describer()?;
        let regions = self.describe(image, &marker.common)?;
        self.localize(&regions, image.dimensions(), params, intrinsics)
    }

    /// Localize one camera from its marker regions.
    ///
    /// Without `intrinsics` the camera matrix is estimated and decomposed;
    /// the recovered intrinsics are reported in the result.
    pub fn localize(
        &self,
        regions: &MarkerRegions,
        image_size: ImageSize,
        params: &LocalizerParameters,
        intrinsics: Option<&CameraIntrinsics>,
    ) -> Result<LocalizationResult> {
        let marker = params.marker()?;
        self.check_regions(regions)?;
        Ok(self.localize_camera(regions, image_size, marker, intrinsics))
    }

    fn localize_camera(
        &self,
        regions: &MarkerRegions,
        image_size: ImageSize,
        params: &MarkerParameters,
        intrinsics: Option<&CameraIntrinsics>,
    ) -> LocalizationResult {
        let common = &params.common;
        let error_max = common.reprojection_error_max;
        let harvest = harvest_associations(regions, &self.database, params);
        let placeholder = intrinsics
            .copied()
            .unwrap_or_else(|| placeholder_intrinsics(image_size));

        let min_points = self.solver.min_points(intrinsics.is_some());
        if harvest.correspondences.len() < min_points {
            debug!(
                "only {} associations, resection needs {}",
                harvest.correspondences.len(),
                min_points
            );
            return failed_result(
                LocalizationStatus::InsufficientData,
                harvest,
                placeholder,
                error_max,
            );
        }

        let resection =
            match self
                .solver
                .resect(harvest.correspondences.as_camera(), intrinsics, common)
            {
                Ok(res) => res,
                Err(err) => {
                    debug!("resection failed: {:#}", err);
                    return failed_result(
                        LocalizationStatus::ResectionFailed,
                        harvest,
                        placeholder,
                        error_max,
                    );
                }
            };
        debug!(
            "resection succeeded with {}/{} inliers",
            resection.inliers.len(),
            harvest.correspondences.len()
        );

        let initial_intrinsics = match (intrinsics, resection.estimated_k) {
            (Some(intr), _) => *intr,
            (None, Some(k)) => {
                let k = FxFyCxCySkew { skew: 0.0, ..k };
                debug!(
                    "estimated K: f = ({:.2}, {:.2}), c = ({:.2}, {:.2})",
                    k.fx, k.fy, k.cx, k.cy
                );
                CameraIntrinsics::new(k, image_size.0, image_size.1)
            }
            (None, None) => placeholder,
        };

        let (points_3d, points_2d) = harvest.correspondences.select(&resection.inliers);
        let (status, pose, used_intrinsics) = match self.solver.refine_pose(
            &points_3d,
            &points_2d,
            &resection.pose,
            &initial_intrinsics,
            common,
        ) {
            Ok((pose, intr)) => (LocalizationStatus::Localized, pose, intr),
            Err(err) => {
                debug!("pose refinement failed: {:#}", err);
                (
                    LocalizationStatus::RefinementFailed,
                    resection.pose,
                    initial_intrinsics,
                )
            }
        };

        let result = LocalizationResult::new(
            status,
            pose,
            used_intrinsics,
            harvest.correspondences,
            resection.inliers,
            harvest.matched_keyframes,
            error_max,
        );
        log_stats("refined pose", &result);
        result
    }

    /// Describe every camera image and localize the rig.
    pub fn localize_rig_images(
        &self,
        images: &[GrayImage],
        params: &LocalizerParameters,
        intrinsics: &[CameraIntrinsics],
        subposes: &[Iso3],
    ) -> Result<RigLocalization> {
        let marker = params.marker()?;
        self.check_describer()?;
        let regions = images
            .iter()
            .map(|img| self.describe(img, &marker.common))
            .collect::<Result<Vec<_>>>()?;
        let sizes: Vec<ImageSize> = images.iter().map(GrayImage::dimensions).collect();
        self.localize_rig(&regions, &sizes, params, intrinsics, subposes)
    }

    /// Localize a rig whose camera `i > 0` sits at `subposes[i - 1]` relative
    /// to camera 0.
    ///
    /// Uses the joint multi-camera strategy when the solver supports it and
    /// the naive per-camera strategy otherwise or on request.
    pub fn localize_rig(
        &self,
        regions: &[MarkerRegions],
        image_sizes: &[ImageSize],
        params: &LocalizerParameters,
        intrinsics: &[CameraIntrinsics],
        subposes: &[Iso3],
    ) -> Result<RigLocalization> {
        let marker = params.marker()?;
        let num_cams = regions.len();
        if num_cams == 0 {
            return Err(config_error("a rig needs at least one camera"));
        }
        if intrinsics.len() != num_cams {
            return Err(config_error(format!(
                "{} cameras but {} intrinsics",
                num_cams,
                intrinsics.len()
            )));
        }
        if image_sizes.len() != num_cams {
            return Err(config_error(format!(
                "{} cameras but {} image sizes",
                num_cams,
                image_sizes.len()
            )));
        }
        if subposes.len() + 1 != num_cams {
            return Err(config_error(format!(
                "{} cameras need {} subposes, got {}",
                num_cams,
                num_cams - 1,
                subposes.len()
            )));
        }
        for r in regions {
            self.check_regions(r)?;
        }
        let rig = RigGeometry::new(subposes.to_vec());

        if self.solver.supports_rig() && !marker.common.use_naive_rig_fallback {
            Ok(self.localize_rig_global(regions, marker, intrinsics, &rig))
        } else {
            if !marker.common.use_naive_rig_fallback {
                debug!("solver has no joint rig resection, using the naive strategy");
            }
            Ok(self.localize_rig_naive(regions, image_sizes, marker, intrinsics, &rig))
        }
    }

    /// Rig resection followed by refinement. `None` when the resection fails;
    /// a failed refinement keeps the resection pose.
    fn solve_rig(
        &self,
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        common: &CommonParameters,
    ) -> Option<(LocalizationStatus, Iso3, Vec<Vec<usize>>)> {
        let resection = match self.solver.resect_rig(cameras, intrinsics, rig, common) {
            Ok(res) => res,
            Err(err) => {
                debug!("rig resection failed: {:#}", err);
                return None;
            }
        };

        let cams_with_inliers = resection.inliers.iter().filter(|v| !v.is_empty()).count();
        if cams_with_inliers < rig.num_cameras() {
            warn!(
                "rig inliers found in {} cameras of a rig of {}",
                cams_with_inliers,
                rig.num_cameras()
            );
        }
        for (cam, inl) in resection.inliers.iter().enumerate() {
            debug!("camera {}: {} inliers after resection", cam, inl.len());
        }
        log_rig_stats(
            "rig resection",
            cameras,
            intrinsics,
            rig,
            &resection.rig_pose,
            &resection.inliers,
        );

        let (status, rig_pose, inliers) = match self.solver.iterative_refine_rig(
            cameras,
            intrinsics,
            rig,
            &resection.rig_pose,
            &resection.inliers,
            common,
        ) {
            Ok((pose, inliers)) => (LocalizationStatus::Localized, pose, inliers),
            Err(err) => {
                debug!("rig refinement failed: {:#}", err);
                (
                    LocalizationStatus::RefinementFailed,
                    resection.rig_pose,
                    resection.inliers,
                )
            }
        };
        log_rig_stats("rig refinement", cameras, intrinsics, rig, &rig_pose, &inliers);
        Some((status, rig_pose, inliers))
    }

    fn localize_rig_global(
        &self,
        regions: &[MarkerRegions],
        params: &MarkerParameters,
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
    ) -> RigLocalization {
        let common = &params.common;
        let error_max = common.reprojection_error_max;
        let harvests: Vec<Harvest> = regions
            .par_iter()
            .map(|r| harvest_associations(r, &self.database, params))
            .collect();
        let num_associations: usize = harvests.iter().map(|h| h.correspondences.len()).sum();

        let fail = |status: LocalizationStatus, harvests: Vec<Harvest>| RigLocalization {
            status,
            rig_pose: None,
            strategy: FusionStrategy::Global,
            results: harvests
                .into_iter()
                .zip(intrinsics)
                .map(|(h, intr)| failed_result(status, h, *intr, error_max))
                .collect(),
            num_associations,
        };

        if num_associations < self.solver.min_rig_points() {
            debug!(
                "only {} associations over the rig, not enough for a resection",
                num_associations
            );
            return fail(LocalizationStatus::InsufficientData, harvests);
        }

        let solved = {
            let cameras: Vec<CameraCorrespondences<'_>> =
                harvests.iter().map(|h| h.correspondences.as_camera()).collect();
            self.solve_rig(&cameras, intrinsics, rig, common)
        };
        let Some((status, rig_pose, inliers)) = solved else {
            return fail(LocalizationStatus::ResectionFailed, harvests);
        };

        let results = harvests
            .into_iter()
            .zip(inliers)
            .zip(intrinsics)
            .enumerate()
            .map(|(cam, ((harvest, cam_inliers), intr))| {
                let pose = rig.camera_pose(&rig_pose, cam).unwrap_or(rig_pose);
                LocalizationResult::new(
                    status,
                    pose,
                    *intr,
                    harvest.correspondences,
                    cam_inliers,
                    harvest.matched_keyframes,
                    error_max,
                )
            })
            .collect();

        RigLocalization {
            status,
            rig_pose: Some(rig_pose),
            strategy: FusionStrategy::Global,
            results,
            num_associations,
        }
    }

    fn localize_rig_naive(
        &self,
        regions: &[MarkerRegions],
        image_sizes: &[ImageSize],
        params: &MarkerParameters,
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
    ) -> RigLocalization {
        let mut results: Vec<LocalizationResult> = regions
            .par_iter()
            .zip(image_sizes.par_iter())
            .zip(intrinsics.par_iter())
            .map(|((r, &size), intr)| self.localize_camera(r, size, params, Some(intr)))
            .collect();
        let num_associations = results.iter().map(|r| r.correspondences().len()).sum();

        for (cam, res) in results.iter().enumerate() {
            if !res.is_valid() {
                warn!("could not localize camera {} ({:?})", cam, res.status());
            }
        }

        let Some(first) = results.iter().position(LocalizationResult::is_valid) else {
            let status = if results
                .iter()
                .all(|r| r.status() == LocalizationStatus::InsufficientData)
            {
                LocalizationStatus::InsufficientData
            } else {
                LocalizationStatus::ResectionFailed
            };
            debug!("no camera of the rig has been localized");
            return RigLocalization {
                status,
                rig_pose: None,
                strategy: FusionStrategy::Naive,
                results,
                num_associations,
            };
        };
        debug!(
            "localized cameras: {}/{}, first is {}",
            results.iter().filter(|r| r.is_valid()).count(),
            results.len(),
            first
        );

        let first_pose = *results[first].pose();
        let initial = rig.rig_pose(&first_pose, first).unwrap_or(first_pose);

        let mut views = Vec::new();
        for (cam, res) in results.iter().enumerate().filter(|(_, r)| r.is_valid()) {
            let Some(cam_from_rig) = rig.camera_from_rig(cam) else {
                continue;
            };
            let (points_3d, points_2d) = res.correspondences().select(res.inliers());
            views.push(CameraViewObservations {
                cam_from_rig,
                k: res.intrinsics().k,
                points_3d,
                points_2d,
            });
        }

        let rig_pose = match self.solver.refine_rig(&views, &initial, &params.common) {
            Ok(pose) => pose,
            Err(err) => {
                debug!("rig pose refinement failed: {:#}", err);
                return RigLocalization {
                    status: LocalizationStatus::RefinementFailed,
                    rig_pose: Some(initial),
                    strategy: FusionStrategy::Naive,
                    results,
                    num_associations,
                };
            }
        };

        results = results
            .into_iter()
            .enumerate()
            .map(|(cam, res)| match rig.camera_pose(&rig_pose, cam) {
                Some(pose) if res.is_valid() => res.with_pose(pose),
                _ => res,
            })
            .collect();
        for (cam, res) in results.iter().enumerate() {
            if res.is_valid() {
                log_stats(&format!("rig camera {}", cam), res);
            }
        }

        RigLocalization {
            status: LocalizationStatus::Localized,
            rig_pose: Some(rig_pose),
            strategy: FusionStrategy::Naive,
            results,
            num_associations,
        }
    }
}
