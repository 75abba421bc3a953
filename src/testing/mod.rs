//! Testing utilities for LiveScope
//!
//! Synthetic frames and frame sources that let the whole pipeline run
//! offline, without a camera.

pub mod scripted;
pub mod synthetic_data;

pub use scripted::{ScriptStep, ScriptedSource};
pub use synthetic_data::{synthetic_frame, SyntheticFrameSpec, SyntheticSource};
