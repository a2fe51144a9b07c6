//! Core math and geometry primitives for `rigloc`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Iso3`, ...),
//! - pinhole intrinsics and camera intrinsics bound to an image size,
//! - rig geometry (fixed camera subposes) and pose composition,
//! - a generic RANSAC engine (`ransac`, [`Estimator`]).
//!
//! Pose convention: every pose is `T_C_W`, mapping world points into the
//! camera frame. For a rig, camera `i > 0` sees the world through
//! `subpose_i * rig_pose`; camera 0 is the rig reference frame.

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera intrinsics models.
pub mod models;
/// Generic RANSAC engine and traits.
pub mod ransac;
/// Multi-camera rig geometry.
pub mod rig;
/// Deterministic synthetic scenes for tests.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use ransac::*;
pub use rig::*;
