pub mod background_landmark_detector;
pub mod execution_provider;
pub mod math;
pub mod onnx_blazeface_detector;
pub mod onnx_landmark_detector;
pub mod onnx_landmark_regressor;
