pub mod pose_refine;
pub mod rig_pose;
