//! Parameter blocks.

pub mod pose;
