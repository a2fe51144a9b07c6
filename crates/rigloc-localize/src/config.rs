//! Localizer parameters.
//!
//! JSON form, tagged by `localizer`:
//!
//! ```json
//! { "localizer": "marker", "n_nearest_keyframes": 6, "reprojection_error_max": 3.0 }
//! ```

use crate::error::{config_error, Result};
use rigloc_core::Real;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker family the map and the queries are described with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DescriberType {
    #[serde(rename = "CCTAG3")]
    CCTag3,
    #[serde(rename = "CCTAG4")]
    CCTag4,
}

impl DescriberType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CCTag3 => "CCTAG3",
            Self::CCTag4 => "CCTAG4",
        }
    }
}

impl fmt::Display for DescriberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DescriberType {
    type Err = crate::LocalizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CCTAG3" => Ok(Self::CCTag3),
            "CCTAG4" => Ok(Self::CCTag4),
            other => Err(config_error(format!("invalid describer type: {}", other))),
        }
    }
}

/// Detector effort preset forwarded to the marker describer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DescriberPreset {
    Low,
    Medium,
    #[default]
    Normal,
    High,
    Ultra,
}

impl DescriberPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Ultra => "ULTRA",
        }
    }
}

impl fmt::Display for DescriberPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DescriberPreset {
    type Err = crate::LocalizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "ULTRA" => Ok(Self::Ultra),
            other => Err(config_error(format!("invalid descriptor preset: {}", other))),
        }
    }
}

/// Parameters shared by every localizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonParameters {
    /// Refine `fx, fy, cx, cy` together with the pose.
    #[serde(default)]
    pub refine_intrinsics: bool,
    /// Pixel reprojection threshold for inliers.
    #[serde(default = "default_reprojection_error_max")]
    pub reprojection_error_max: Real,
    /// Angular inlier threshold (degrees) of the multi-camera resection.
    #[serde(default = "default_angular_threshold_deg")]
    pub angular_threshold_deg: Real,
    /// Localize rig cameras one by one and compose, even if joint
    /// resection is available.
    #[serde(default)]
    pub use_naive_rig_fallback: bool,
    #[serde(default)]
    pub feature_preset: DescriberPreset,
    #[serde(default = "default_ransac_max_iterations")]
    pub ransac_max_iterations: usize,
    #[serde(default = "default_ransac_seed")]
    pub ransac_seed: u64,
    /// Rounds of the iterative rig refinement.
    #[serde(default = "default_rig_refine_max_iterations")]
    pub rig_refine_max_iterations: usize,
    /// Fewest inliers the rig refinement may end with.
    #[serde(default = "default_rig_min_points")]
    pub rig_min_points: usize,
}

impl Default for CommonParameters {
    fn default() -> Self {
        Self {
            refine_intrinsics: false,
            reprojection_error_max: default_reprojection_error_max(),
            angular_threshold_deg: default_angular_threshold_deg(),
            use_naive_rig_fallback: false,
            feature_preset: DescriberPreset::Normal,
            ransac_max_iterations: default_ransac_max_iterations(),
            ransac_seed: default_ransac_seed(),
            rig_refine_max_iterations: default_rig_refine_max_iterations(),
            rig_min_points: default_rig_min_points(),
        }
    }
}

fn default_reprojection_error_max() -> Real {
    4.0
}

fn default_angular_threshold_deg() -> Real {
    0.1
}

fn default_ransac_max_iterations() -> usize {
    1024
}

fn default_ransac_seed() -> u64 {
    1_234_567
}

fn default_rig_refine_max_iterations() -> usize {
    10
}

fn default_rig_min_points() -> usize {
    4
}

impl CommonParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.reprojection_error_max.is_finite() && self.reprojection_error_max > 0.0) {
            return Err(config_error(format!(
                "reprojection_error_max must be positive and finite, got {}",
                self.reprojection_error_max
            )));
        }
        if !(self.angular_threshold_deg.is_finite() && self.angular_threshold_deg > 0.0) {
            return Err(config_error(format!(
                "angular_threshold_deg must be positive and finite, got {}",
                self.angular_threshold_deg
            )));
        }
        if self.ransac_max_iterations == 0 {
            return Err(config_error("ransac_max_iterations must be at least 1"));
        }
        if self.rig_refine_max_iterations == 0 {
            return Err(config_error("rig_refine_max_iterations must be at least 1"));
        }
        Ok(())
    }

    pub fn angular_threshold_rad(&self) -> Real {
        self.angular_threshold_deg.to_radians()
    }
}

/// Parameters of the marker localizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerParameters {
    #[serde(flatten)]
    pub common: CommonParameters,
    /// Number of keyframes retrieved per query image.
    #[serde(default = "default_n_nearest_keyframes")]
    pub n_nearest_keyframes: usize,
    /// Keyframes sharing fewer markers than this with the query are ignored.
    #[serde(default)]
    pub min_similarity: u32,
}

impl Default for MarkerParameters {
    fn default() -> Self {
        Self {
            common: CommonParameters::default(),
            n_nearest_keyframes: default_n_nearest_keyframes(),
            min_similarity: 0,
        }
    }
}

fn default_n_nearest_keyframes() -> usize {
    4
}

impl MarkerParameters {
    pub fn validate(&self) -> Result<()> {
        self.common.validate()?;
        if self.n_nearest_keyframes == 0 {
            return Err(config_error("n_nearest_keyframes must be at least 1"));
        }
        Ok(())
    }
}

/// Parameters of a localization call, tagged by localizer kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "localizer", rename_all = "snake_case")]
pub enum LocalizerParameters {
    Common(CommonParameters),
    Marker(MarkerParameters),
}

impl Default for LocalizerParameters {
    fn default() -> Self {
        Self::Marker(MarkerParameters::default())
    }
}

impl From<MarkerParameters> for LocalizerParameters {
    fn from(params: MarkerParameters) -> Self {
        Self::Marker(params)
    }
}

impl LocalizerParameters {
    pub fn common(&self) -> &CommonParameters {
        match self {
            Self::Common(common) => common,
            Self::Marker(marker) => &marker.common,
        }
    }

    /// Validated marker parameters; any other variant is rejected.
    pub fn marker(&self) -> Result<&MarkerParameters> {
        match self {
            Self::Marker(marker) => {
                marker.validate()?;
                Ok(marker)
            }
            Self::Common(_) => Err(config_error(
                "marker localizer requires marker parameters, got common parameters",
            )),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalizeError;

    #[test]
    fn defaults_match_documented_values() {
        let p = MarkerParameters::default();
        assert_eq!(p.n_nearest_keyframes, 4);
        assert_eq!(p.min_similarity, 0);
        assert!(!p.common.refine_intrinsics);
        assert_eq!(p.common.reprojection_error_max, 4.0);
        assert_eq!(p.common.angular_threshold_deg, 0.1);
        assert!(!p.common.use_naive_rig_fallback);
        assert_eq!(p.common.feature_preset, DescriberPreset::Normal);
        assert_eq!(p.common.rig_refine_max_iterations, 10);
        assert_eq!(p.common.rig_min_points, 4);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn tagged_json_fills_defaults() {
        let p = LocalizerParameters::from_json_str(
            r#"{"localizer": "marker", "n_nearest_keyframes": 6, "feature_preset": "HIGH"}"#,
        )
        .unwrap();
        let marker = p.marker().unwrap();
        assert_eq!(marker.n_nearest_keyframes, 6);
        assert_eq!(marker.common.feature_preset, DescriberPreset::High);
        assert_eq!(marker.common.reprojection_error_max, 4.0);

        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""localizer":"marker""#), "{}", json);
        assert_eq!(LocalizerParameters::from_json_str(&json).unwrap(), p);
    }

    #[test]
    fn common_variant_is_rejected_by_marker_accessor() {
        let p = LocalizerParameters::from_json_str(r#"{"localizer": "common"}"#).unwrap();
        assert!(matches!(p.marker(), Err(LocalizeError::Configuration(_))));
        assert_eq!(p.common().ransac_max_iterations, 1024);
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let mut p = MarkerParameters {
            n_nearest_keyframes: 0,
            ..MarkerParameters::default()
        };
        assert!(matches!(p.validate(), Err(LocalizeError::Configuration(_))));
        p.n_nearest_keyframes = 2;
        p.common.reprojection_error_max = -1.0;
        assert!(p.validate().is_err());
        p.common.reprojection_error_max = 2.0;
        p.common.angular_threshold_deg = Real::NAN;
        assert!(p.validate().is_err());
        p.common.angular_threshold_deg = 0.5;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn preset_and_describer_strings_roundtrip() {
        for preset in [
            DescriberPreset::Low,
            DescriberPreset::Medium,
            DescriberPreset::Normal,
            DescriberPreset::High,
            DescriberPreset::Ultra,
        ] {
            assert_eq!(preset.to_string().parse::<DescriberPreset>().unwrap(), preset);
            let json = serde_json::to_string(&preset).unwrap();
            assert_eq!(json, format!("\"{}\"", preset));
        }
        assert!("EXTREME".parse::<DescriberPreset>().is_err());
        for ty in [DescriberType::CCTag3, DescriberType::CCTag4] {
            assert_eq!(ty.to_string().parse::<DescriberType>().unwrap(), ty);
        }
        assert!(DescriberType::CCTag3 < DescriberType::CCTag4);
    }
}
