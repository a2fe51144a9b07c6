//! Reconstructed map and the keyframe database built from it.

use crate::config::DescriberType;
use crate::describer::{MarkerFeature, MarkerRegions};
use crate::error::{LocalizeError, Result};
use crate::retrieval::ViewSignature;
use log::debug;
use rigloc_core::Pt3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub type ViewId = u32;
pub type LandmarkId = u32;

/// A reconstructed view with all of its detected markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub id: ViewId,
    #[serde(default)]
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    pub features: Vec<MarkerFeature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapObservation {
    pub view_id: ViewId,
    /// Index into the view's features.
    pub feature_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLandmark {
    pub id: LandmarkId,
    pub describer: DescriberType,
    pub position: Pt3,
    pub observations: Vec<MapObservation>,
}

/// Serialized reconstruction: views, landmarks and their observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMap {
    pub views: Vec<MapView>,
    pub landmarks: Vec<MapLandmark>,
}

impl SceneMap {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub id: LandmarkId,
    pub describer: DescriberType,
    pub position: Pt3,
}

/// A view restricted to its reconstructed markers.
#[derive(Debug, Clone)]
pub struct Keyframe {
    pub id: ViewId,
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    /// Reconstructed markers only, by increasing original feature id.
    pub regions: MarkerRegions,
    /// `landmark_ids[local]` is the landmark observed by `regions.features[local]`.
    pub landmark_ids: Vec<LandmarkId>,
    pub signature: ViewSignature,
}

impl Keyframe {
    pub fn landmark_of(&self, local_feature: usize) -> Option<LandmarkId> {
        self.landmark_ids.get(local_feature).copied()
    }
}

/// Diagnostics about a freshly built database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub num_views: usize,
    pub num_keyframes: usize,
    pub num_landmarks: usize,
    /// Marker identities present in at least one keyframe.
    pub marker_ids: BTreeSet<u32>,
    /// Views by number of reconstructed markers: `[0, 1, 2, 3, 4, 5+]`.
    pub markers_per_view: [usize; 6],
}

/// Read-only keyframe and landmark store used for association harvesting.
#[derive(Debug, Clone)]
pub struct AssociationDatabase {
    describer: DescriberType,
    keyframes: BTreeMap<ViewId, Keyframe>,
    landmarks: BTreeMap<LandmarkId, Landmark>,
    summary: DatabaseSummary,
}

fn invalid(msg: String) -> LocalizeError {
    LocalizeError::InvalidMap(msg)
}

impl AssociationDatabase {
    /// Build keyframes from the landmarks of type `describer`.
    ///
    /// Each view keeps only the markers observed by a landmark of that type;
    /// views without any are not keyframes.
    pub fn from_scene(scene: &SceneMap, describer: DescriberType) -> Result<Self> {
        let mut views = BTreeMap::new();
        for view in &scene.views {
            if views.insert(view.id, view).is_some() {
                return Err(invalid(format!("duplicate view id {}", view.id)));
            }
        }

        let mut landmarks = BTreeMap::new();
        let mut observations: BTreeMap<ViewId, Vec<(usize, LandmarkId)>> = BTreeMap::new();
        for lm in &scene.landmarks {
            let entry = Landmark {
                id: lm.id,
                describer: lm.describer,
                position: lm.position,
            };
            if landmarks.insert(lm.id, entry).is_some() {
                return Err(invalid(format!("duplicate landmark id {}", lm.id)));
            }
            if lm.describer != describer {
                continue;
            }
            for obs in &lm.observations {
                let view = views.get(&obs.view_id).ok_or_else(|| {
                    invalid(format!(
                        "landmark {} is observed in unknown view {}",
                        lm.id, obs.view_id
                    ))
                })?;
                if obs.feature_id >= view.features.len() {
                    return Err(invalid(format!(
                        "landmark {} references feature {} of view {} which has {} features",
                        lm.id,
                        obs.feature_id,
                        obs.view_id,
                        view.features.len()
                    )));
                }
                observations
                    .entry(obs.view_id)
                    .or_default()
                    .push((obs.feature_id, lm.id));
            }
        }

        let mut keyframes = BTreeMap::new();
        for (view_id, mut obs) in observations {
            obs.sort_unstable();
            let Some(view) = views.get(&view_id).copied() else {
                continue;
            };
            let features = obs.iter().map(|&(f, _)| view.features[f]).collect();
            let regions = MarkerRegions::new(describer, features);
            let signature = ViewSignature::from_regions(&regions);
            keyframes.insert(
                view_id,
                Keyframe {
                    id: view_id,
                    image_path: view.image_path.clone(),
                    width: view.width,
                    height: view.height,
                    regions,
                    landmark_ids: obs.iter().map(|&(_, lm)| lm).collect(),
                    signature,
                },
            );
        }

        let summary = summarize(scene, &keyframes, landmarks.len());
        log_summary(&summary, &keyframes);

        Ok(Self {
            describer,
            keyframes,
            landmarks,
            summary,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>, describer: DescriberType) -> Result<Self> {
        Self::from_scene(&SceneMap::from_json_file(path)?, describer)
    }

    pub fn describer_type(&self) -> DescriberType {
        self.describer
    }

    /// Keyframes by increasing id.
    pub fn keyframes(&self) -> impl Iterator<Item = &Keyframe> {
        self.keyframes.values()
    }

    pub fn keyframe(&self, id: ViewId) -> Option<&Keyframe> {
        self.keyframes.get(&id)
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    pub fn summary(&self) -> &DatabaseSummary {
        &self.summary
    }
}

fn summarize(
    scene: &SceneMap,
    keyframes: &BTreeMap<ViewId, Keyframe>,
    num_landmarks: usize,
) -> DatabaseSummary {
    let mut markers_per_view = [0usize; 6];
    let mut marker_ids = BTreeSet::new();
    for view in &scene.views {
        let count = keyframes.get(&view.id).map_or(0, |kf| kf.regions.len());
        markers_per_view[count.min(5)] += 1;
    }
    for kf in keyframes.values() {
        marker_ids.extend(kf.regions.features.iter().filter_map(|f| f.marker_id));
    }
    DatabaseSummary {
        num_views: scene.views.len(),
        num_keyframes: keyframes.len(),
        num_landmarks,
        marker_ids,
        markers_per_view,
    }
}

fn log_summary(summary: &DatabaseSummary, keyframes: &BTreeMap<ViewId, Keyframe>) {
    for kf in keyframes.values() {
        let ids: Vec<String> = kf
            .regions
            .features
            .iter()
            .filter_map(|f| f.marker_id.map(|id| id.to_string()))
            .collect();
        debug!("keyframe {} ({}) markers: {}", kf.id, kf.image_path, ids.join(" "));
    }
    for (count, views) in summary.markers_per_view.iter().enumerate().take(5) {
        debug!("views with {} markers: {}", count, views);
    }
    debug!("views with 5+ markers: {}", summary.markers_per_view[5]);
    debug!(
        "database: {} keyframes out of {} views, {} distinct marker ids, {} landmarks",
        summary.num_keyframes,
        summary.num_views,
        summary.marker_ids.len(),
        summary.num_landmarks
    );
}
