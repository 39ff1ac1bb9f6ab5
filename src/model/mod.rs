mod decoder;
mod encoder;
pub mod params;
mod pose_net;

pub use decoder::{PoseDecoder, PoseDecoderInit, PoseDecoderOutput};
pub use encoder::{PoseEncoder, PoseEncoderInit};
pub use pose_net::{PairPose, PoseModelKind, PoseNet, PoseNetInit};
