// pose regression head
pub const SQUEEZE_CHANNELS: i64 = 256;
pub const POSE_HIDDEN_CHANNELS: i64 = 256;
pub const POSE_PARAMS: i64 = 6; // axis-angle (3) + translation (3)
pub const POSE_SCALE: f64 = 0.001; // applied to the raw regression output
pub const DEFAULT_FRAMES_TO_PREDICT: i64 = 1;
pub const DEFAULT_POSE_STRIDE: i64 = 1;

// pose encoder
pub const IMAGE_CHANNELS: i64 = 3;
pub const RESNET_CHANNELS: [i64; 5] = [64, 64, 128, 256, 512];
pub const INPUT_MEAN: f64 = 0.45;
pub const INPUT_STD: f64 = 0.225;

// geometry
pub const AXISANGLE_EPS: f64 = 1e-7;
