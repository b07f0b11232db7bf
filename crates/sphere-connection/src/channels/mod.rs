//! Ready-made channels.

mod motion;

pub use motion::{MotionChannel, MOTION_PROTOCOL};
