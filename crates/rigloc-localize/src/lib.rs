//! Marker-based localization of cameras and multi-camera rigs.
//!
//! Pipeline per query image:
//! 1. retrieve the keyframes sharing the most marker identities
//!    ([`k_nearest_keyframes`]),
//! 2. match markers by identity and vote 2D-3D associations
//!    ([`harvest_associations`]),
//! 3. resect and refine the camera pose ([`PoseSolver`]).
//!
//! A rig is localized either jointly (multi-camera RANSAC with an angular
//! threshold, then iterative refinement with fixed subposes) or naively
//! (per-camera localization composed through the subposes, then a joint
//! refinement). See [`MarkerLocalizer::localize_rig`].

pub mod config;
pub mod database;
pub mod describer;
pub mod error;
pub mod harvest;
pub mod localizer;
pub mod result;
pub mod retrieval;
pub mod solver;

pub use config::{
    CommonParameters, DescriberPreset, DescriberType, LocalizerParameters, MarkerParameters,
};
pub use database::{
    AssociationDatabase, DatabaseSummary, Keyframe, Landmark, LandmarkId, MapLandmark,
    MapObservation, MapView, SceneMap, ViewId,
};
pub use describer::{MarkerDescriber, MarkerFeature, MarkerRegions};
pub use error::{LocalizeError, Result};
pub use harvest::{
    harvest_associations, view_matching, AssociationKey, CorrespondenceSet, FeatureMatch,
    Harvest, KeyframeMatch, OccurrenceMap,
};
pub use image::GrayImage;
pub use localizer::{ImageSize, MarkerLocalizer};
pub use result::{
    ErrorStats, FusionStrategy, LocalizationResult, LocalizationStatus, RigLocalization,
};
pub use retrieval::{k_nearest_keyframes, view_similarity, RetrievedKeyframe, ViewSignature};
pub use solver::{DefaultPoseSolver, PoseSolver, ResectionOutput, RigResectionOutput};
