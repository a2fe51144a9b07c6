//! Single-camera localization against a synthetic marker map.
//!
//! Validates:
//! 1. Exact associations with trusted intrinsics localize the camera
//! 2. Without intrinsics the camera matrix is estimated and decomposed
//! 3. Degenerate geometry and sparse associations report their status
//! 4. A failing refinement keeps the resection pose
//! 5. Describer plumbing, configuration errors and map loading
//! 6. A describer of the wrong marker type is rejected before detection

mod common;

use common::*;
use rigloc_core::{pose_distance, synthetic, Pt3};
use rigloc_localize::{
    AssociationDatabase, CommonParameters, DescriberPreset, DescriberType, LocalizationStatus,
    LocalizeError, LocalizerParameters, MarkerLocalizer, MarkerParameters, MarkerRegions,
    SceneMap,
};

#[test]
fn trusted_intrinsics_localize_exactly() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.05, -0.1, 0.02], [0.1, 0.0, 0.2]);
    let world = synthetic::visible_points(&intr, &pose_gt, 3, 2, 3.0);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 1, &world, 10);
    add_view(&mut scene, 2, &world[..4], 10);
    let localizer = MarkerLocalizer::new(database(&scene), FixedDescriber::new(Vec::new()));

    let query = query_regions(&intr, &pose_gt, &world, 10);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap();

    assert!(res.is_valid(), "status: {:?}", res.status());
    assert_eq!(res.correspondences().len(), 6);
    assert_eq!(res.inliers(), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(res.matched_keyframes().len(), 2);
    let (ang, dt) = pose_distance(res.pose(), &pose_gt);
    assert!(ang < 1e-6 && dt < 1e-6, "pose error: {} rad, {} m", ang, dt);
    let stats = res.inlier_error_stats().unwrap();
    assert!(stats.max < 1e-6, "max reprojection error: {}", stats.max);
}

#[test]
fn unknown_intrinsics_are_estimated() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([-0.08, 0.12, 0.0], [-0.2, 0.1, 0.4]);
    let world = synthetic::visible_points(&intr, &pose_gt, 4, 3, 2.5);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 1, &world, 0);
    let localizer = MarkerLocalizer::new(database(&scene), FixedDescriber::new(Vec::new()));

    let query = query_regions(&intr, &pose_gt, &world, 0);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), None)
        .unwrap();

    assert!(res.is_valid(), "status: {:?}", res.status());
    assert_eq!(res.inliers().len(), 12);
    let k = res.intrinsics().k;
    assert!((k.fx - 900.0).abs() < 1e-3, "fx: {}", k.fx);
    assert!((k.cx - 640.0).abs() < 1e-3, "cx: {}", k.cx);
    assert_eq!(k.skew, 0.0);
    let (ang, dt) = pose_distance(res.pose(), &pose_gt);
    assert!(ang < 1e-5 && dt < 1e-5, "pose error: {} rad, {} m", ang, dt);
}

#[test]
fn collinear_landmarks_fail_resection() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
    let world: Vec<Pt3> = (0..6)
        .map(|i| Pt3::new(-0.5 + 0.2 * i as f64, 0.1, 3.0))
        .collect();

    let mut scene = SceneMap::default();
    add_view(&mut scene, 1, &world, 0);
    let localizer = MarkerLocalizer::new(database(&scene), FixedDescriber::new(Vec::new()));

    let query = query_regions(&intr, &pose_gt, &world, 0);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap();
    assert_eq!(res.status(), LocalizationStatus::ResectionFailed);
    assert_eq!(res.correspondences().len(), 6);
    assert!(res.inliers().is_empty());
}

#[test]
fn too_few_associations_skip_resection() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.0, 0.1, 0.0], [0.0, 0.0, 0.5]);
    let world = synthetic::visible_points(&intr, &pose_gt, 3, 2, 3.0);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 1, &world[..3], 0);
    let localizer = MarkerLocalizer::with_solver(
        database(&scene),
        FixedDescriber::new(Vec::new()),
        InstrumentedSolver::default(),
    );

    // Markers 3.. are unknown to the map.
    let query = query_regions(&intr, &pose_gt, &world, 0);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap();
    assert_eq!(res.status(), LocalizationStatus::InsufficientData);
    assert_eq!(res.correspondences().len(), 3);
    assert_eq!(localizer.solver().resect_calls(), 0);

    // Six points are needed without intrinsics.
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), None)
        .unwrap();
    assert_eq!(res.status(), LocalizationStatus::InsufficientData);
    assert_eq!(res.intrinsics().k.fx, 1280.0);
}

#[test]
fn failed_refinement_keeps_resection_pose() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.1, 0.0, -0.05], [0.3, -0.1, 0.0]);
    let world = synthetic::visible_points(&intr, &pose_gt, 3, 3, 2.0);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 1, &world, 40);
    let solver = InstrumentedSolver {
        fail_refinement: true,
        ..InstrumentedSolver::default()
    };
    let localizer =
        MarkerLocalizer::with_solver(database(&scene), FixedDescriber::new(Vec::new()), solver);

    let query = query_regions(&intr, &pose_gt, &world, 40);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap();
    assert_eq!(res.status(), LocalizationStatus::RefinementFailed);
    assert!(!res.is_valid());
    assert_eq!(res.inliers().len(), 9);
    let (ang, dt) = pose_distance(res.pose(), &pose_gt);
    assert!(ang < 1e-6 && dt < 1e-6, "pose error: {} rad, {} m", ang, dt);
}

#[test]
fn image_is_described_with_preset_and_device() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.0, 0.05, 0.0], [0.0, 0.1, 0.3]);
    let world = synthetic::visible_points(&intr, &pose_gt, 3, 2, 3.0);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 7, &world, 0);
    let describer = FixedDescriber::new(vec![query_regions(&intr, &pose_gt, &world, 0)]);
    let calls = describer.calls.clone();
    let mut localizer = MarkerLocalizer::new(database(&scene), describer);
    localizer.set_device_pipe(2);

    let params = LocalizerParameters::from(MarkerParameters {
        common: CommonParameters {
            feature_preset: DescriberPreset::High,
            ..CommonParameters::default()
        },
        ..MarkerParameters::default()
    });
    let res = localizer
        .localize_image(&tagged_image(0), &params, Some(&intr))
        .unwrap();
    assert!(res.is_valid());

    let err = localizer
        .localize_image(&tagged_image(3), &params, Some(&intr))
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Detection(_)), "{}", err);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![(DescriberPreset::High, 2), (DescriberPreset::High, 2)]
    );
}

#[test]
fn image_without_markers_has_insufficient_data() {
    let describer = FixedDescriber::new(vec![MarkerRegions::empty(DESCRIBER)]);
    let calls = describer.calls.clone();
    let localizer = MarkerLocalizer::new(database(&SceneMap::default()), describer);
    let res = localizer
        .localize_image(&tagged_image(0), &LocalizerParameters::default(), None)
        .unwrap();
    assert_eq!(res.status(), LocalizationStatus::InsufficientData);
    assert!(res.correspondences().is_empty());
    assert_eq!(*calls.lock().unwrap(), vec![(DescriberPreset::Normal, 0)]);
}

#[test]
fn configuration_errors_abort_the_call() {
    let intr = synthetic::default_intrinsics();
    let localizer =
        MarkerLocalizer::new(database(&SceneMap::default()), FixedDescriber::new(Vec::new()));
    let query = MarkerRegions::empty(DESCRIBER);

    let common = LocalizerParameters::Common(CommonParameters::default());
    let err = localizer
        .localize(&query, (1280, 720), &common, Some(&intr))
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Configuration(_)), "{}", err);

    let invalid = LocalizerParameters::from(MarkerParameters {
        n_nearest_keyframes: 0,
        ..MarkerParameters::default()
    });
    let err = localizer
        .localize(&query, (1280, 720), &invalid, Some(&intr))
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Configuration(_)), "{}", err);

    let other = MarkerRegions::empty(DescriberType::CCTag4);
    let err = localizer
        .localize(&other, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Configuration(_)), "{}", err);
}

#[test]
fn describer_of_another_type_is_rejected_before_detection() {
    let describer = FixedDescriber {
        kind: DescriberType::CCTag4,
        ..FixedDescriber::new(vec![MarkerRegions::empty(DescriberType::CCTag4)])
    };
    let calls = describer.calls.clone();
    let localizer = MarkerLocalizer::new(database(&SceneMap::default()), describer);
    let params = LocalizerParameters::default();

    let err = localizer
        .localize_image(&tagged_image(0), &params, None)
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Configuration(_)), "{}", err);
    let err = localizer
        .localize_rig_images(
            &[tagged_image(0)],
            &params,
            &[synthetic::default_intrinsics()],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, LocalizeError::Configuration(_)), "{}", err);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn map_loaded_from_json_file_localizes() {
    let intr = synthetic::default_intrinsics();
    let pose_gt = synthetic::pose([0.02, -0.04, 0.1], [0.0, 0.2, 0.1]);
    let world = synthetic::visible_points(&intr, &pose_gt, 4, 2, 3.0);

    let mut scene = SceneMap::default();
    add_view(&mut scene, 3, &world, 60);
    let path = std::env::temp_dir().join(format!("rigloc_map_{}.json", std::process::id()));
    std::fs::write(&path, scene.to_json_string().unwrap()).unwrap();
    let db = AssociationDatabase::from_json_file(&path, DESCRIBER);
    std::fs::remove_file(&path).unwrap();
    let db = db.unwrap();
    assert_eq!(db.num_landmarks(), 8);
    assert_eq!(db.num_keyframes(), 1);

    let localizer = MarkerLocalizer::new(db, FixedDescriber::new(Vec::new()));
    let query = query_regions(&intr, &pose_gt, &world, 60);
    let res = localizer
        .localize(&query, (1280, 720), &LocalizerParameters::default(), Some(&intr))
        .unwrap();
    assert!(res.is_valid());
    let (ang, dt) = pose_distance(res.pose(), &pose_gt);
    assert!(ang < 1e-6 && dt < 1e-6, "pose error: {} rad, {} m", ang, dt);
}
