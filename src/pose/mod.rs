pub mod detection;
#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
pub mod letterbox;
#[cfg(feature = "desktop")]
pub mod preprocess;

pub use detection::{best_candidate, keypoint_count, BoundingBox, Detection};
#[cfg(feature = "desktop")]
pub use detector::PoseModel;
pub use keypoint::{Keypoint, KeypointIndex};
pub use letterbox::{LetterboxTransform, Padding};
#[cfg(feature = "desktop")]
pub use preprocess::letterbox_frame;
