pub mod banana;
pub mod filter;
pub mod joint_loss;
pub mod last_good;
pub mod localizer;
pub mod mirror;
pub mod ratios;
pub mod smoothing;

pub use banana::{detect_banana, BananaCheck, BananaReason};
pub use filter::{FilterResult, FilterState, StabilityFilter};
pub use joint_loss::{detect_joint_loss, JointLoss};
pub use last_good::LastKnownGood;
pub use localizer::{localize_corruption, CorruptionMap, JointSet};
pub use mirror::{body_center_x, mirror_pose};
pub use ratios::{calculate_ratios, check_ratio_deviation, AnthropometricRatios};
pub use smoothing::{simulate_pose, smooth_pose};
