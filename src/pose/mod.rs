pub mod keypoint;

pub use keypoint::{BoundingBox, Keypoint, KeypointIndex, Pose};
