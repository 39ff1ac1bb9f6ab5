use super::params;
use crate::common::*;

// output type

#[derive(Debug, TensorLike)]
pub struct PoseDecoderOutput {
    /// Axis-angle rotation in shape `[batch, frames, 1, 3]`.
    pub axisangle: Tensor,
    /// Translation in shape `[batch, frames, 1, 3]`.
    pub translation: Tensor,
}

#[derive(Debug, Clone)]
pub struct PoseDecoderInit {
    /// Encoder output channels per scale. Only the deepest one is consumed.
    pub num_ch_enc: Vec<i64>,
    pub num_input_features: i64,
    pub num_frames_to_predict: i64,
    pub stride: i64,
}

impl PoseDecoderInit {
    pub fn new(num_ch_enc: Vec<i64>, num_input_features: i64) -> Self {
        Self {
            num_ch_enc,
            num_input_features,
            num_frames_to_predict: params::DEFAULT_FRAMES_TO_PREDICT,
            stride: params::DEFAULT_POSE_STRIDE,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Fallible<PoseDecoder>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            num_ch_enc,
            num_input_features,
            num_frames_to_predict,
            stride,
        } = self;

        let enc_channels = match num_ch_enc.last() {
            Some(&channels) => channels,
            None => bail!("num_ch_enc must not be empty"),
        };
        ensure!(
            num_ch_enc.iter().all(|&channels| channels > 0),
            "encoder channel counts must be positive, but get {:?}",
            num_ch_enc
        );
        ensure!(
            num_input_features > 0,
            "num_input_features must be positive, but get {}",
            num_input_features
        );
        ensure!(
            num_frames_to_predict > 0,
            "num_frames_to_predict must be positive, but get {}",
            num_frames_to_predict
        );
        ensure!(stride > 0, "stride must be positive, but get {}", stride);

        let conv_config = |padding, stride| nn::ConvConfig {
            padding,
            stride,
            ..Default::default()
        };

        // registered in the order squeeze, pose 0, pose 1, pose 2 under `net.{0..3}`
        let net_path = path / "net";
        let squeeze = nn::conv2d(
            &net_path / 0,
            enc_channels,
            params::SQUEEZE_CHANNELS,
            1,
            conv_config(0, 1),
        );

        let pose_convs = [
            nn::conv2d(
                &net_path / 1,
                num_input_features * params::SQUEEZE_CHANNELS,
                params::POSE_HIDDEN_CHANNELS,
                3,
                conv_config(1, stride),
            ),
            nn::conv2d(
                &net_path / 2,
                params::POSE_HIDDEN_CHANNELS,
                params::POSE_HIDDEN_CHANNELS,
                3,
                conv_config(1, stride),
            ),
            nn::conv2d(
                &net_path / 3,
                params::POSE_HIDDEN_CHANNELS,
                params::POSE_PARAMS * num_frames_to_predict,
                1,
                conv_config(0, 1),
            ),
        ];

        debug!(
            "built pose decoder with {} input features, {} frames to predict",
            num_input_features, num_frames_to_predict
        );

        Ok(PoseDecoder {
            enc_channels,
            num_input_features,
            num_frames_to_predict,
            squeeze,
            pose_convs,
        })
    }
}

#[derive(Debug)]
pub struct PoseDecoder {
    // model params
    enc_channels: i64,
    num_input_features: i64,
    num_frames_to_predict: i64,
    // modules & weights
    squeeze: Conv2D,
    pose_convs: [Conv2D; 3],
}

impl PoseDecoder {
    pub fn num_input_features(&self) -> i64 {
        self.num_input_features
    }

    pub fn num_frames_to_predict(&self) -> i64 {
        self.num_frames_to_predict
    }

    /// Checks the shapes of consumed feature maps against the decoder configuration.
    pub fn check_input(&self, input_features: &[Vec<Tensor>]) -> Fallible<()> {
        ensure!(
            input_features.len() as i64 == self.num_input_features,
            "expect {} input features, but get {}",
            self.num_input_features,
            input_features.len()
        );

        let shapes = input_features
            .iter()
            .enumerate()
            .map(|(index, scales)| {
                let last = scales
                    .last()
                    .ok_or_else(|| format_err!("input feature {} has no scales", index))?;
                let (b, c, h, w) = last.size4().map_err(|_| {
                    format_err!(
                        "input feature {} must be 4-dimensional, but get shape {:?}",
                        index,
                        last.size()
                    )
                })?;
                ensure!(
                    c == self.enc_channels,
                    "input feature {} has {} channels, but the encoder outputs {}",
                    index,
                    c,
                    self.enc_channels
                );
                Ok((b, h, w))
            })
            .collect::<Fallible<Vec<_>>>()?;

        ensure!(
            shapes.iter().all_equal(),
            "input features disagree in batch or spatial size: {:?}",
            shapes
        );

        Ok(())
    }

    /// Runs the regression layers and returns the pooled output before scaling,
    /// in shape `[batch, 6 * frames]`.
    pub fn regress(&self, input_features: &[Vec<Tensor>]) -> Tensor {
        debug_assert_eq!(input_features.len() as i64, self.num_input_features);

        let squeezed = input_features
            .iter()
            .map(|scales| {
                let last = scales.last().expect("input feature has no scales");
                last.apply(&self.squeeze).relu()
            })
            .collect::<Vec<_>>();
        let cat_features = Tensor::cat(&squeezed, 1);

        let [conv0, conv1, conv2] = &self.pose_convs;
        let out = cat_features.apply(conv0).relu();
        let out = out.apply(conv1).relu();
        let out = out.apply(conv2);

        // reduce mean of width, then height dimension
        let kind = out.kind();
        out.mean_dim(&[3], false, kind).mean_dim(&[2], false, kind)
    }

    pub fn forward(&self, input_features: &[Vec<Tensor>]) -> PoseDecoderOutput {
        let out = self.regress(input_features) * params::POSE_SCALE;
        let out = out.view([-1, self.num_frames_to_predict, 1, params::POSE_PARAMS]);

        let axisangle = out.narrow(3, 0, 3);
        let translation = out.narrow(3, 3, 3);

        PoseDecoderOutput {
            axisangle,
            translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(batch: i64, channels: i64, size: i64) -> Vec<Tensor> {
        vec![
            Tensor::randn(&[batch, 8, size * 2, size * 2], (Kind::Float, Device::Cpu)),
            Tensor::randn(&[batch, channels, size, size], (Kind::Float, Device::Cpu)),
        ]
    }

    #[test]
    fn output_shapes() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let decoder = PoseDecoderInit::new(vec![16, 32, 64], 2)
            .build(vs.root())
            .unwrap();

        let input = vec![features(1, 64, 8), features(1, 64, 8)];
        decoder.check_input(&input).unwrap();
        let PoseDecoderOutput {
            axisangle,
            translation,
        } = decoder.forward(&input);

        assert_eq!(axisangle.size(), vec![1, 1, 1, 3]);
        assert_eq!(translation.size(), vec![1, 1, 1, 3]);
    }

    #[test]
    fn multiple_frames_with_stride() {
        tch::manual_seed(1);
        let vs = VarStore::new(Device::Cpu);
        let decoder = PoseDecoderInit {
            num_frames_to_predict: 2,
            stride: 2,
            ..PoseDecoderInit::new(vec![64, 512], 1)
        }
        .build(vs.root())
        .unwrap();

        let input = vec![features(3, 512, 6)];
        let output = decoder.forward(&input);

        assert_eq!(output.axisangle.size(), vec![3, 2, 1, 3]);
        assert_eq!(output.translation.size(), vec![3, 2, 1, 3]);
    }

    #[test]
    fn parameter_names() {
        let vs = VarStore::new(Device::Cpu);
        let _decoder = PoseDecoderInit::new(vec![64], 1).build(vs.root()).unwrap();

        let names = vs.variables().into_keys().collect::<HashSet<_>>();
        for name in [
            "net.0.weight",
            "net.0.bias",
            "net.1.weight",
            "net.1.bias",
            "net.2.weight",
            "net.2.bias",
            "net.3.weight",
            "net.3.bias",
        ] {
            assert!(names.contains(name), "missing parameter {}", name);
        }
        assert_eq!(names.len(), 8);

        // squeeze first, then the three pose convs
        let variables = vs.variables();
        assert_eq!(variables["net.0.weight"].size(), vec![256, 64, 1, 1]);
        assert_eq!(variables["net.1.weight"].size(), vec![256, 256, 3, 3]);
        assert_eq!(variables["net.2.weight"].size(), vec![256, 256, 3, 3]);
        assert_eq!(variables["net.3.weight"].size(), vec![6, 256, 1, 1]);
    }

    #[test]
    fn double_precision_output() {
        tch::manual_seed(4);
        let mut vs = VarStore::new(Device::Cpu);
        let decoder = PoseDecoderInit::new(vec![32], 1).build(vs.root()).unwrap();
        vs.double();

        let input = vec![features(2, 32, 4)
            .into_iter()
            .map(|tensor| tensor.to_kind(Kind::Double))
            .collect::<Vec<_>>()];
        let output = decoder.forward(&input);

        assert_eq!(decoder.regress(&input).kind(), Kind::Double);
        assert_eq!(output.axisangle.kind(), Kind::Double);
        assert_eq!(output.translation.kind(), Kind::Double);
    }

    #[test]
    #[should_panic(expected = "input feature has no scales")]
    fn forward_panics_on_empty_scales() {
        let vs = VarStore::new(Device::Cpu);
        let decoder = PoseDecoderInit::new(vec![64], 1).build(vs.root()).unwrap();
        decoder.forward(&[vec![]]);
    }

    #[test]
    fn reject_invalid_config() {
        let vs = VarStore::new(Device::Cpu);
        assert!(PoseDecoderInit::new(vec![], 1).build(vs.root()).is_err());
        assert!(PoseDecoderInit::new(vec![64, 0], 1).build(vs.root()).is_err());
        assert!(PoseDecoderInit::new(vec![64], 0).build(vs.root()).is_err());
        assert!(PoseDecoderInit {
            stride: 0,
            ..PoseDecoderInit::new(vec![64], 1)
        }
        .build(vs.root())
        .is_err());
        assert!(PoseDecoderInit {
            num_frames_to_predict: -1,
            ..PoseDecoderInit::new(vec![64], 1)
        }
        .build(vs.root())
        .is_err());
    }

    #[test]
    fn reject_mismatched_input() {
        let vs = VarStore::new(Device::Cpu);
        let decoder = PoseDecoderInit::new(vec![64], 2).build(vs.root()).unwrap();

        // wrong number of features
        assert!(decoder.check_input(&[features(1, 64, 4)]).is_err());
        // wrong channel count
        assert!(decoder
            .check_input(&[features(1, 64, 4), features(1, 32, 4)])
            .is_err());
        // batch mismatch
        assert!(decoder
            .check_input(&[features(1, 64, 4), features(2, 64, 4)])
            .is_err());
        // empty scale list
        assert!(decoder.check_input(&[features(1, 64, 4), vec![]]).is_err());
    }
}
