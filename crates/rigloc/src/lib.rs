//! High-level entry crate for `rigloc`, marker-based localization of single
//! cameras and multi-camera rigs against a reconstructed marker map.
//!
//! # Quick Start
//!
//! ```no_run
//! use rigloc::prelude::*;
//!
//! fn locate<D: MarkerDescriber>(describer: D, image: &GrayImage) -> anyhow::Result<()> {
//!     let database = AssociationDatabase::from_json_file("map.json", DescriberType::CCTag3)?;
//!     let localizer = MarkerLocalizer::new(database, describer);
//!
//!     let params = LocalizerParameters::default();
//!     let result = localizer.localize_image(image, &params, None)?;
//!     if result.is_valid() {
//!         println!("pose: {}", result.pose());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`core`] - Math types, camera intrinsics, rig geometry, RANSAC
//! - [`linear`] - P3P, camera-matrix DLT, single-camera and rig resection
//! - [`optim`] - Levenberg-Marquardt pose and rig refinement
//! - [`localize`] - Map database, retrieval, association harvesting, localizer

pub use rigloc_core as core;
pub use rigloc_linear as linear;
pub use rigloc_localize as localize;
pub use rigloc_optim as optim;

pub use rigloc_core::{CameraIntrinsics, FxFyCxCySkew, Iso3, Pt2, Pt3, RigGeometry};
pub use rigloc_localize::{
    AssociationDatabase, CommonParameters, DefaultPoseSolver, DescriberPreset, DescriberType,
    FusionStrategy, GrayImage, LocalizationResult, LocalizationStatus, LocalizeError,
    LocalizerParameters, MarkerDescriber, MarkerFeature, MarkerLocalizer, MarkerParameters,
    MarkerRegions, PoseSolver, RigLocalization, SceneMap,
};

/// Convenient re-exports for common use cases.
///
/// ```no_run
/// use rigloc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AssociationDatabase, CameraIntrinsics, CommonParameters, DescriberPreset,
        DescriberType, FusionStrategy, GrayImage, Iso3, LocalizationResult, LocalizationStatus,
        LocalizerParameters, MarkerDescriber, MarkerFeature, MarkerLocalizer, MarkerParameters,
        MarkerRegions, Pt2, Pt3, RigLocalization, SceneMap,
    };
}
