#[cfg(feature = "onnx")]
pub mod detector;
pub mod extractor;
pub mod landmark;
#[cfg(feature = "onnx")]
pub mod preprocess;

#[cfg(feature = "onnx")]
pub use detector::PoseDetector;
pub use extractor::LandmarkExtractor;
pub use landmark::{Landmark, LandmarkIndex, LandmarkSet, BODY_START, LANDMARK_COUNT};
#[cfg(feature = "onnx")]
pub use preprocess::preprocess_for_blazepose;
