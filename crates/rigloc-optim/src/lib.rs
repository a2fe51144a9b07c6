//! Non-linear refinement of camera and rig poses.
//!
//! Problems implement [`NllsProblem`] and are solved through a
//! [`NllsSolverBackend`]; [`LmBackend`] wraps the `levenberg-marquardt`
//! crate. Jacobians come from forward-mode autodiff (`num-dual`) applied
//! per correspondence.

pub mod backend_lm;
pub mod math;
pub mod params;
pub mod problems;
pub mod traits;

pub use backend_lm::LmBackend;
pub use problems::pose_refine::{refine_pose, PoseRefineOptions, PoseRefineResult};
pub use problems::rig_pose::{
    iterative_refine_rig_pose, refine_rig_pose, CameraViewObservations, RigRefineOptions,
    RigRefineResult,
};
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
