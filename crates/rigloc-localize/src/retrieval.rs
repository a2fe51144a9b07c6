//! Keyframe retrieval by marker-visibility similarity.
//!
//! Every image is summarized by the set of marker identities it sees, stored
//! as a 128-bit signature. Two images are as similar as the number of
//! identities they share.

use crate::database::{AssociationDatabase, ViewId};
use crate::describer::{MarkerFeature, MarkerRegions, DESCRIPTOR_LEN};
use log::debug;

/// Set of visible marker identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ViewSignature(u128);

impl ViewSignature {
    /// Undecoded markers and identities outside the vocabulary set no bit.
    pub fn from_features(features: &[MarkerFeature]) -> Self {
        let bits = features
            .iter()
            .filter_map(|f| f.marker_id)
            .filter(|&id| (id as usize) < DESCRIPTOR_LEN)
            .fold(0u128, |acc, id| acc | (1u128 << id));
        Self(bits)
    }

    pub fn from_regions(regions: &MarkerRegions) -> Self {
        Self::from_features(&regions.features)
    }

    pub fn bits(self) -> u128 {
        self.0
    }

    pub fn contains(self, marker_id: u32) -> bool {
        (marker_id as usize) < DESCRIPTOR_LEN && self.0 & (1u128 << marker_id) != 0
    }

    /// Number of distinct identities.
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Number of identities shared with `other`.
    pub fn similarity(self, other: Self) -> u32 {
        (self.0 & other.0).count_ones()
    }
}

pub fn view_similarity(a: &MarkerRegions, b: &MarkerRegions) -> u32 {
    ViewSignature::from_regions(a).similarity(ViewSignature::from_regions(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievedKeyframe {
    pub keyframe_id: ViewId,
    pub similarity: u32,
}

/// Up to `k` keyframes ranked by decreasing similarity with the query.
///
/// Keyframes scoring below `min_similarity` are never returned. Equal scores
/// come out by decreasing keyframe id. An empty result is valid.
pub fn k_nearest_keyframes(
    query: &MarkerRegions,
    database: &AssociationDatabase,
    k: usize,
    min_similarity: u32,
) -> Vec<RetrievedKeyframe> {
    let signature = ViewSignature::from_regions(query);
    let mut ranked: Vec<RetrievedKeyframe> = database
        .keyframes()
        .map(|kf| RetrievedKeyframe {
            keyframe_id: kf.id,
            similarity: signature.similarity(kf.signature),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.similarity
            .cmp(&a.similarity)
            .then(b.keyframe_id.cmp(&a.keyframe_id))
    });

    let selected: Vec<RetrievedKeyframe> = ranked
        .into_iter()
        .take_while(|r| r.similarity >= min_similarity)
        .take(k)
        .collect();
    debug!(
        "retrieval: {} of {} keyframes selected (k = {}, floor = {})",
        selected.len(),
        database.num_keyframes(),
        k,
        min_similarity
    );
    selected
}
