//! Marker features and the detector seam.

use crate::config::{DescriberPreset, DescriberType};
use crate::error::Result;
use image::GrayImage;
use rigloc_core::Pt2;
use serde::{Deserialize, Serialize};

/// Length of a raw marker descriptor; also the marker vocabulary size.
pub const DESCRIPTOR_LEN: usize = 128;

/// Marker identity encoded in a raw descriptor: the index of the single
/// byte set to 255, `None` if there is no such byte.
pub fn decode_marker_id(descriptor: &[u8]) -> Option<u32> {
    descriptor
        .iter()
        .position(|&b| b == u8::MAX)
        .and_then(|i| u32::try_from(i).ok())
}

/// Raw descriptor encoding `marker_id`, all zeros if the id is undefined or
/// outside the vocabulary.
pub fn encode_marker_id(marker_id: Option<u32>) -> [u8; DESCRIPTOR_LEN] {
    let mut out = [0u8; DESCRIPTOR_LEN];
    if let Some(slot) = marker_id.and_then(|id| out.get_mut(id as usize)) {
        *slot = u8::MAX;
    }
    out
}

/// One detected marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerFeature {
    /// Marker center in pixels.
    pub position: Pt2,
    /// Decoded identity; `None` when the marker could not be decoded.
    #[serde(default)]
    pub marker_id: Option<u32>,
}

impl MarkerFeature {
    pub fn new(position: Pt2, marker_id: Option<u32>) -> Self {
        Self {
            position,
            marker_id,
        }
    }

    pub fn from_descriptor(position: Pt2, descriptor: &[u8]) -> Self {
        Self::new(position, decode_marker_id(descriptor))
    }
}

/// Markers detected in one image; the index of a feature is its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRegions {
    pub describer: DescriberType,
    pub features: Vec<MarkerFeature>,
}

impl MarkerRegions {
    pub fn new(describer: DescriberType, features: Vec<MarkerFeature>) -> Self {
        Self {
            describer,
            features,
        }
    }

    pub fn empty(describer: DescriberType) -> Self {
        Self::new(describer, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn position(&self, feature_id: usize) -> Option<Pt2> {
        self.features.get(feature_id).map(|f| f.position)
    }
}

/// Marker detector and describer.
///
/// Implementations wrap an actual detector; `device_pipe` selects the
/// compute device when the detector supports several.
pub trait MarkerDescriber: Send + Sync {
    fn describer_type(&self) -> DescriberType;

    fn describe(
        &self,
        image: &GrayImage,
        preset: DescriberPreset,
        device_pipe: usize,
    ) -> Result<MarkerRegions>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_encodes_marker_id() {
        let desc = encode_marker_id(Some(42));
        assert_eq!(decode_marker_id(&desc), Some(42));
        assert_eq!(decode_marker_id(&encode_marker_id(None)), None);
        assert_eq!(decode_marker_id(&encode_marker_id(Some(500))), None);

        let f = MarkerFeature::from_descriptor(Pt2::new(1.0, 2.0), &encode_marker_id(Some(7)));
        assert_eq!(f.marker_id, Some(7));
    }

    #[test]
    fn regions_index_features() {
        let regions = MarkerRegions::new(
            DescriberType::CCTag3,
            vec![
                MarkerFeature::new(Pt2::new(10.0, 20.0), Some(3)),
                MarkerFeature::new(Pt2::new(30.0, 40.0), None),
            ],
        );
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.position(1), Some(Pt2::new(30.0, 40.0)));
        assert!(regions.position(2).is_none());
        assert!(MarkerRegions::empty(DescriberType::CCTag4).is_empty());
    }
}
