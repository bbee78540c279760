pub mod canvas;
pub mod skeleton;

pub use canvas::{draw_pose, draw_score_bar};
pub use skeleton::{score_color, LIVE_COLOR, REFERENCE_COLOR, SKELETON_CONNECTIONS};
