//! 2D-3D association harvesting with occurrence voting.
//!
//! Query markers are matched by identity against every retrieved keyframe;
//! each match proposes the keyframe feature's landmark for the query
//! feature. Identical proposals from several keyframes add up as votes.

use crate::config::{DescriberType, MarkerParameters};
use crate::database::{AssociationDatabase, LandmarkId, ViewId};
use crate::describer::{MarkerFeature, MarkerRegions};
use crate::retrieval::k_nearest_keyframes;
use log::{debug, trace};
use rigloc_core::{CameraCorrespondences, Pt2, Pt3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Match between query feature `query` and keyframe feature `keyframe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMatch {
    pub query: usize,
    pub keyframe: usize,
}

/// Each decoded query marker matches the first keyframe marker with the same
/// identity, if any.
pub fn view_matching(query: &[MarkerFeature], keyframe: &[MarkerFeature]) -> Vec<FeatureMatch> {
    query
        .iter()
        .enumerate()
        .filter_map(|(i, qf)| {
            let id = qf.marker_id?;
            keyframe
                .iter()
                .position(|kf| kf.marker_id == Some(id))
                .map(|j| FeatureMatch {
                    query: i,
                    keyframe: j,
                })
        })
        .collect()
}

/// Candidate correspondence between a landmark and a query feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssociationKey {
    pub landmark_id: LandmarkId,
    pub describer: DescriberType,
    pub feature_id: usize,
}

/// Vote count per association, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceMap(BTreeMap<AssociationKey, usize>);

impl OccurrenceMap {
    pub fn vote(&mut self, key: AssociationKey) {
        *self.0.entry(key).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, key: &AssociationKey) -> usize {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssociationKey, &usize)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &AssociationKey> {
        self.0.keys()
    }

    /// Number of associations per vote count.
    pub fn histogram(&self) -> BTreeMap<usize, usize> {
        let mut hist = BTreeMap::new();
        for &votes in self.0.values() {
            *hist.entry(votes).or_insert(0) += 1;
        }
        hist
    }
}

/// Parallel 2D/3D points, one per association in occurrence-map order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    pub points_2d: Vec<Pt2>,
    pub points_3d: Vec<Pt3>,
    pub keys: Vec<AssociationKey>,
}

impl CorrespondenceSet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn as_camera(&self) -> CameraCorrespondences<'_> {
        CameraCorrespondences::new(&self.points_2d, &self.points_3d)
    }

    /// Points at `indices`, as `(points_3d, points_2d)`.
    pub fn select(&self, indices: &[usize]) -> (Vec<Pt3>, Vec<Pt2>) {
        indices
            .iter()
            .filter(|&&i| i < self.len())
            .map(|&i| (self.points_3d[i], self.points_2d[i]))
            .unzip()
    }
}

/// A retrieved keyframe and how many query markers it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframeMatch {
    pub keyframe_id: ViewId,
    pub num_matches: usize,
}

/// Everything harvested for one query image.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub occurrences: OccurrenceMap,
    pub correspondences: CorrespondenceSet,
    pub matched_keyframes: Vec<KeyframeMatch>,
}

/// Retrieve keyframes for `query`, vote their matches and materialize the
/// correspondence set.
pub fn harvest_associations(
    query: &MarkerRegions,
    database: &AssociationDatabase,
    params: &MarkerParameters,
) -> Harvest {
    let describer = database.describer_type();
    let nearest = k_nearest_keyframes(
        query,
        database,
        params.n_nearest_keyframes,
        params.min_similarity,
    );

    let mut occurrences = OccurrenceMap::default();
    let mut matched_keyframes = Vec::with_capacity(nearest.len());
    for retrieved in &nearest {
        let Some(keyframe) = database.keyframe(retrieved.keyframe_id) else {
            continue;
        };
        let matches = view_matching(&query.features, &keyframe.regions.features);
        debug!(
            "keyframe {} (similarity {}): {} matches",
            keyframe.id,
            retrieved.similarity,
            matches.len()
        );
        matched_keyframes.push(KeyframeMatch {
            keyframe_id: keyframe.id,
            num_matches: matches.len(),
        });
        for m in matches {
            if let Some(landmark_id) = keyframe.landmark_of(m.keyframe) {
                occurrences.vote(AssociationKey {
                    landmark_id,
                    describer,
                    feature_id: m.query,
                });
            }
        }
    }

    let mut correspondences = CorrespondenceSet::default();
    for key in occurrences.keys() {
        let (Some(pt2), Some(landmark)) = (
            query.position(key.feature_id),
            database.landmark(key.landmark_id),
        ) else {
            continue;
        };
        correspondences.points_2d.push(pt2);
        correspondences.points_3d.push(landmark.position);
        correspondences.keys.push(*key);
    }

    log_occurrences(&occurrences);
    Harvest {
        occurrences,
        correspondences,
        matched_keyframes,
    }
}

fn log_occurrences(occurrences: &OccurrenceMap) {
    debug!("collected {} associations", occurrences.len());
    for (key, votes) in occurrences.iter() {
        trace!(
            "association {} landmark {} / feature {} seen {} times",
            key.describer,
            key.landmark_id,
            key.feature_id,
            votes
        );
    }
    let total = occurrences.len().max(1) as f64;
    for (votes, count) in occurrences.histogram() {
        debug!(
            "{} associations occurred {} times ({:.1}%)",
            count,
            votes,
            100.0 * count as f64 / total
        );
    }
}
