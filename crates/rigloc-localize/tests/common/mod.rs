#![allow(dead_code)]

use image::GrayImage;
use rigloc_core::{
    synthetic, CameraCorrespondences, CameraIntrinsics, Iso3, Pt2, Pt3, RigGeometry,
};
use rigloc_localize::{
    AssociationDatabase, CommonParameters, DefaultPoseSolver, DescriberPreset, DescriberType,
    LocalizeError, MapLandmark, MapObservation, MapView, MarkerDescriber, MarkerFeature,
    MarkerRegions, PoseSolver, ResectionOutput, RigResectionOutput, SceneMap,
};
use rigloc_optim::CameraViewObservations;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DESCRIBER: DescriberType = DescriberType::CCTag3;

/// Add a map view observing `points` as markers `first_marker..`; every
/// point becomes a landmark with id `1000 + marker id`.
pub fn add_view(scene: &mut SceneMap, view_id: u32, points: &[Pt3], first_marker: u32) {
    let features = (0..points.len())
        .map(|i| MarkerFeature::new(Pt2::new(10.0 * i as f64, 5.0), Some(first_marker + i as u32)))
        .collect();
    scene.views.push(MapView {
        id: view_id,
        image_path: format!("keyframe_{}.png", view_id),
        width: 1280,
        height: 720,
        features,
    });
    for (i, p) in points.iter().enumerate() {
        let marker = first_marker + i as u32;
        let landmark_id = 1000 + marker;
        let obs = MapObservation {
            view_id,
            feature_id: i,
        };
        match scene.landmarks.iter_mut().find(|lm| lm.id == landmark_id) {
            Some(lm) => lm.observations.push(obs),
            None => scene.landmarks.push(MapLandmark {
                id: landmark_id,
                describer: DESCRIBER,
                position: *p,
                observations: vec![obs],
            }),
        }
    }
}

/// Markers `first_marker..` seen by a camera at `pose`.
pub fn query_regions(
    intrinsics: &CameraIntrinsics,
    pose: &Iso3,
    points: &[Pt3],
    first_marker: u32,
) -> MarkerRegions {
    let pixels = synthetic::project_all(intrinsics, pose, points).unwrap();
    let features = pixels
        .into_iter()
        .enumerate()
        .map(|(i, px)| MarkerFeature::new(px, Some(first_marker + i as u32)))
        .collect();
    MarkerRegions::new(DESCRIBER, features)
}

pub fn database(scene: &SceneMap) -> AssociationDatabase {
    AssociationDatabase::from_scene(scene, DESCRIBER).unwrap()
}

/// Describer returning fixed regions and recording how it was called.
pub struct FixedDescriber {
    pub kind: DescriberType,
    pub regions: Vec<MarkerRegions>,
    pub calls: Arc<Mutex<Vec<(DescriberPreset, usize)>>>,
}

impl FixedDescriber {
    pub fn new(regions: Vec<MarkerRegions>) -> Self {
        Self {
            kind: DESCRIBER,
            regions,
            calls: Arc::default(),
        }
    }
}

impl MarkerDescriber for FixedDescriber {
    fn describer_type(&self) -> DescriberType {
        self.kind
    }

    /// The image's first pixel value picks the regions to return.
    fn describe(
        &self,
        image: &GrayImage,
        preset: DescriberPreset,
        device_pipe: usize,
    ) -> Result<MarkerRegions, LocalizeError> {
        self.calls.lock().unwrap().push((preset, device_pipe));
        let idx = image.get_pixel(0, 0)[0] as usize;
        self.regions
            .get(idx)
            .cloned()
            .ok_or_else(|| LocalizeError::Detection(format!("no regions for image {}", idx)))
    }
}

/// Image whose first pixel selects regions `idx` of a [`FixedDescriber`].
pub fn tagged_image(idx: u8) -> GrayImage {
    GrayImage::from_pixel(1280, 720, image::Luma([idx]))
}

/// Default solver with call counters and switchable failures.
#[derive(Default)]
pub struct InstrumentedSolver {
    pub inner: DefaultPoseSolver,
    pub resect_calls: AtomicUsize,
    pub rig_resect_calls: AtomicUsize,
    pub fail_refinement: bool,
    /// Breaks only the joint rig refinement of the naive strategy.
    pub fail_rig_refinement: bool,
    pub no_rig_support: bool,
}

impl InstrumentedSolver {
    pub fn rig_resect_calls(&self) -> usize {
        self.rig_resect_calls.load(Ordering::SeqCst)
    }

    pub fn resect_calls(&self) -> usize {
        self.resect_calls.load(Ordering::SeqCst)
    }
}

impl PoseSolver for InstrumentedSolver {
    fn min_points(&self, trusted_intrinsics: bool) -> usize {
        self.inner.min_points(trusted_intrinsics)
    }

    fn resect(
        &self,
        correspondences: CameraCorrespondences<'_>,
        intrinsics: Option<&CameraIntrinsics>,
        params: &CommonParameters,
    ) -> anyhow::Result<ResectionOutput> {
        self.resect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resect(correspondences, intrinsics, params)
    }

    fn refine_pose(
        &self,
        points_3d: &[Pt3],
        points_2d: &[Pt2],
        pose: &Iso3,
        intrinsics: &CameraIntrinsics,
        params: &CommonParameters,
    ) -> anyhow::Result<(Iso3, CameraIntrinsics)> {
        if self.fail_refinement {
            anyhow::bail!("refinement disabled");
        }
        self.inner
            .refine_pose(points_3d, points_2d, pose, intrinsics, params)
    }

    fn supports_rig(&self) -> bool {
        !self.no_rig_support
    }

    fn resect_rig(
        &self,
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        params: &CommonParameters,
    ) -> anyhow::Result<RigResectionOutput> {
        self.rig_resect_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resect_rig(cameras, intrinsics, rig, params)
    }

    fn iterative_refine_rig(
        &self,
        cameras: &[CameraCorrespondences<'_>],
        intrinsics: &[CameraIntrinsics],
        rig: &RigGeometry,
        rig_pose: &Iso3,
        inliers: &[Vec<usize>],
        params: &CommonParameters,
    ) -> anyhow::Result<(Iso3, Vec<Vec<usize>>)> {
        if self.fail_refinement {
            anyhow::bail!("refinement disabled");
        }
        self.inner
            .iterative_refine_rig(cameras, intrinsics, rig, rig_pose, inliers, params)
    }

    fn refine_rig(
        &self,
        views: &[CameraViewObservations],
        rig_pose: &Iso3,
        params: &CommonParameters,
    ) -> anyhow::Result<Iso3> {
        if self.fail_refinement || self.fail_rig_refinement {
            anyhow::bail!("refinement disabled");
        }
        self.inner.refine_rig(views, rig_pose, params)
    }
}
