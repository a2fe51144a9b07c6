//! Perspective-n-Point minimal solvers.
//!
//! P3P is exposed on pixels (with intrinsics) and on unit bearing vectors.
//! The bearing form is what the rig solver uses, since each camera of the
//! rig contributes rays in its own frame.

mod p3p;
mod pose_utils;

pub use p3p::{p3p, p3p_bearings};
pub use pose_utils::pose_from_points;
