use super::{
    decoder::{PoseDecoder, PoseDecoderInit, PoseDecoderOutput},
    encoder::{PoseEncoder, PoseEncoderInit},
    params,
};
use crate::{common::*, geometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoseModelKind {
    /// A dedicated encoder sees both frames stacked along channels.
    #[serde(rename = "separate")]
    Separate,
    /// Each frame is encoded on its own and the decoder fuses the features.
    #[serde(rename = "shared")]
    Shared,
}

#[derive(Debug)]
pub struct PairPose {
    pub frame_id: i64,
    pub axisangle: Tensor,
    pub translation: Tensor,
    /// `[batch, 4, 4]` transform from the target frame to this source frame.
    pub cam_t_cam: Tensor,
}

#[derive(Debug, Clone)]
pub struct PoseNetInit {
    pub kind: PoseModelKind,
    pub num_layers: usize,
    pub stride: i64,
}

impl PoseNetInit {
    pub fn new(kind: PoseModelKind) -> Self {
        Self {
            kind,
            num_layers: 18,
            stride: params::DEFAULT_POSE_STRIDE,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Fallible<PoseNet>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            kind,
            num_layers,
            stride,
        } = self;

        let (encoder, decoder) = match kind {
            PoseModelKind::Separate => {
                let encoder =
                    PoseEncoderInit::new(num_layers, 2).build(path / "pose_encoder")?;
                let decoder = PoseDecoderInit {
                    num_frames_to_predict: 2,
                    stride,
                    ..PoseDecoderInit::new(encoder.num_ch_enc(), 1)
                }
                .build(path / "pose")?;
                (encoder, decoder)
            }
            PoseModelKind::Shared => {
                let encoder = PoseEncoderInit::new(num_layers, 1).build(path / "encoder")?;
                let decoder = PoseDecoderInit {
                    stride,
                    ..PoseDecoderInit::new(encoder.num_ch_enc(), 2)
                }
                .build(path / "pose")?;
                (encoder, decoder)
            }
        };

        info!("built {:?} pose network on resnet{}", kind, num_layers);

        Ok(PoseNet {
            kind,
            encoder,
            decoder,
        })
    }
}

#[derive(Debug)]
pub struct PoseNet {
    kind: PoseModelKind,
    encoder: PoseEncoder,
    decoder: PoseDecoder,
}

impl PoseNet {
    pub fn kind(&self) -> PoseModelKind {
        self.kind
    }

    pub fn decoder(&self) -> &PoseDecoder {
        &self.decoder
    }

    /// Regresses the pose between a source and a target batch of images,
    /// each in shape `[batch, 3, height, width]`.
    pub fn forward_pair(
        &self,
        source: &Tensor,
        target: &Tensor,
        train: bool,
    ) -> Fallible<PoseDecoderOutput> {
        ensure!(
            source.size() == target.size(),
            "source and target images disagree in shape: {:?} vs {:?}",
            source.size(),
            target.size()
        );

        let input_features = match self.kind {
            PoseModelKind::Separate => {
                let pair = Tensor::cat(&[source, target], 1);
                vec![self.encoder.forward_t(&pair, train)]
            }
            PoseModelKind::Shared => vec![
                self.encoder.forward_t(source, train),
                self.encoder.forward_t(target, train),
            ],
        };

        self.decoder.check_input(&input_features)?;
        Ok(self.decoder.forward(&input_features))
    }

    /// Predicts the pose from frame 0 to every other frame in `frame_ids`.
    pub fn predict_poses(
        &self,
        frames: &HashMap<i64, Tensor>,
        frame_ids: &[i64],
        train: bool,
    ) -> Fallible<Vec<PairPose>> {
        ensure!(
            frame_ids.first() == Some(&0),
            "frame_ids must start with 0, but get {:?}",
            frame_ids
        );
        let target = frames
            .get(&0)
            .ok_or_else(|| format_err!("the target frame 0 is missing"))?;

        frame_ids[1..]
            .iter()
            .map(|&frame_id| {
                let source = frames
                    .get(&frame_id)
                    .ok_or_else(|| format_err!("the source frame {} is missing", frame_id))?;

                let PoseDecoderOutput {
                    axisangle,
                    translation,
                } = self.forward_pair(source, target, train)?;

                let cam_t_cam = geometry::transformation_from_parameters(
                    &axisangle.select(1, 0),
                    &translation.select(1, 0),
                    false,
                );

                Ok(PairPose {
                    frame_id,
                    axisangle,
                    translation,
                    cam_t_cam,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(batch: i64) -> Tensor {
        Tensor::rand(&[batch, 3, 64, 64], (Kind::Float, Device::Cpu))
    }

    #[test]
    fn separate_predicts_two_frames() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let net = PoseNetInit::new(PoseModelKind::Separate)
            .build(vs.root())
            .unwrap();

        let output = net.forward_pair(&images(2), &images(2), false).unwrap();
        assert_eq!(output.axisangle.size(), vec![2, 2, 1, 3]);
        assert_eq!(output.translation.size(), vec![2, 2, 1, 3]);
    }

    #[test]
    fn shared_fuses_two_features() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let net = PoseNetInit::new(PoseModelKind::Shared)
            .build(vs.root())
            .unwrap();
        assert_eq!(net.decoder().num_input_features(), 2);

        let variables = vs.variables();
        assert_eq!(variables["pose.net.0.weight"].size(), vec![256, 512, 1, 1]);
        assert_eq!(variables["pose.net.1.weight"].size(), vec![256, 512, 3, 3]);
        assert!(variables.contains_key("encoder.encoder.conv1.weight"));

        let output = net.forward_pair(&images(1), &images(1), false).unwrap();
        assert_eq!(output.axisangle.size(), vec![1, 1, 1, 3]);
        assert_eq!(output.translation.size(), vec![1, 1, 1, 3]);
    }

    #[test]
    fn predict_poses_for_neighbors() {
        tch::manual_seed(2);
        let vs = VarStore::new(Device::Cpu);
        let net = PoseNetInit::new(PoseModelKind::Separate)
            .build(vs.root())
            .unwrap();

        let frames: HashMap<_, _> = vec![(0, images(1)), (-1, images(1)), (1, images(1))]
            .into_iter()
            .collect();
        let poses = tch::no_grad(|| net.predict_poses(&frames, &[0, -1, 1], false)).unwrap();

        assert_eq!(
            poses.iter().map(|pose| pose.frame_id).collect::<Vec<_>>(),
            vec![-1, 1]
        );
        for pose in &poses {
            assert_eq!(pose.cam_t_cam.size(), vec![1, 4, 4]);
            assert_eq!(pose.cam_t_cam.double_value(&[0, 3, 3]), 1.0);
        }
    }

    #[test]
    fn predict_poses_rejects_bad_frames() {
        let vs = VarStore::new(Device::Cpu);
        let net = PoseNetInit::new(PoseModelKind::Shared)
            .build(vs.root())
            .unwrap();

        let frames: HashMap<_, _> = vec![(0, images(1))].into_iter().collect();
        assert!(net.predict_poses(&frames, &[1, 0], false).is_err());
        assert!(net.predict_poses(&frames, &[0, 1], false).is_err());
        assert!(net
            .forward_pair(
                &images(1),
                &Tensor::rand(&[1, 3, 32, 64], (Kind::Float, Device::Cpu)),
                false
            )
            .is_err());
    }
}
