//! Linear and minimal solvers for camera resection.
//!
//! - [`math`]: Hartley normalization and real polynomial roots.
//! - [`camera_matrix`]: normalized DLT for `P = K [R | t]` and its RQ decomposition.
//! - [`pnp`]: Kneip-style P3P on pixels or bearing vectors.
//! - [`resection`]: single-camera RANSAC resection, with or without trusted intrinsics.
//! - [`rig_resection`]: multi-camera RANSAC resection of a rig pose under an
//!   angular inlier threshold.
//!
//! All poses are `T_C_W` (world to camera).

pub mod camera_matrix;
pub mod math;
pub mod pnp;
pub mod resection;
pub mod rig_resection;

pub use camera_matrix::*;
pub use pnp::*;
pub use resection::*;
pub use rig_resection::*;
