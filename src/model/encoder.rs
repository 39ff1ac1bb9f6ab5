use super::params;
use crate::common::*;

#[derive(Debug, Clone)]
pub struct PoseEncoderInit {
    pub num_layers: usize,
    pub num_input_images: i64,
}

impl PoseEncoderInit {
    pub fn new(num_layers: usize, num_input_images: i64) -> Self {
        Self {
            num_layers,
            num_input_images,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Fallible<PoseEncoder>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            num_layers,
            num_input_images,
        } = self;

        let blocks_per_layer: [usize; 4] = match num_layers {
            18 => [2, 2, 2, 2],
            34 => [3, 4, 6, 3],
            _ => bail!(
                "only 18 and 34 layer encoders are supported, but get {}",
                num_layers
            ),
        };
        ensure!(
            num_input_images > 0,
            "num_input_images must be positive, but get {}",
            num_input_images
        );

        let path = path / "encoder";
        let conv1 = nn::conv2d(
            &path / "conv1",
            num_input_images * params::IMAGE_CHANNELS,
            params::RESNET_CHANNELS[0],
            7,
            nn::ConvConfig {
                stride: 2,
                padding: 3,
                bias: false,
                ..Default::default()
            },
        );
        let bn1 = nn::batch_norm2d(&path / "bn1", params::RESNET_CHANNELS[0], Default::default());

        let layers = blocks_per_layer
            .iter()
            .enumerate()
            .map(|(index, &num_blocks)| {
                let in_channels = params::RESNET_CHANNELS[index];
                let out_channels = params::RESNET_CHANNELS[index + 1];
                let stride = if index == 0 { 1 } else { 2 };
                let layer_path = &path / format!("layer{}", index + 1);

                (0..num_blocks)
                    .map(|block_index| {
                        if block_index == 0 {
                            BasicBlock::new(&layer_path / 0, in_channels, out_channels, stride)
                        } else {
                            BasicBlock::new(&layer_path / block_index, out_channels, out_channels, 1)
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        debug!(
            "built resnet{} pose encoder for {} input images",
            num_layers, num_input_images
        );

        Ok(PoseEncoder {
            num_input_images,
            conv1,
            bn1,
            layers,
        })
    }
}

#[derive(Debug)]
pub struct PoseEncoder {
    num_input_images: i64,
    conv1: Conv2D,
    bn1: BatchNorm,
    layers: Vec<Vec<BasicBlock>>,
}

impl PoseEncoder {
    pub fn num_ch_enc(&self) -> Vec<i64> {
        params::RESNET_CHANNELS.to_vec()
    }

    pub fn num_input_images(&self) -> i64 {
        self.num_input_images
    }

    /// Encodes images with values in `[0, 1]` and returns feature maps
    /// from the shallowest to the deepest scale.
    pub fn forward_t(&self, input_image: &Tensor, train: bool) -> Vec<Tensor> {
        debug_assert_eq!(
            input_image.size()[1],
            self.num_input_images * params::IMAGE_CHANNELS
        );

        let x = (input_image - params::INPUT_MEAN) / params::INPUT_STD;
        let first = x.apply(&self.conv1).apply_t(&self.bn1, train).relu();
        let pooled = first.max_pool2d(&[3, 3], &[2, 2], &[1, 1], &[1, 1], false);

        let mut features = vec![first];
        let mut net = pooled;
        for blocks in &self.layers {
            net = blocks
                .iter()
                .fold(net, |net, block| block.forward_t(&net, train));
            features.push(net.shallow_clone());
        }

        features
    }
}

#[derive(Debug)]
struct BasicBlock {
    conv1: Conv2D,
    bn1: BatchNorm,
    conv2: Conv2D,
    bn2: BatchNorm,
    downsample: Option<(Conv2D, BatchNorm)>,
}

impl BasicBlock {
    fn new<'p, P>(path: P, in_channels: i64, out_channels: i64, stride: i64) -> Self
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let conv_config = |padding, stride| nn::ConvConfig {
            padding,
            stride,
            bias: false,
            ..Default::default()
        };

        let conv1 = nn::conv2d(
            path / "conv1",
            in_channels,
            out_channels,
            3,
            conv_config(1, stride),
        );
        let bn1 = nn::batch_norm2d(path / "bn1", out_channels, Default::default());
        let conv2 = nn::conv2d(
            path / "conv2",
            out_channels,
            out_channels,
            3,
            conv_config(1, 1),
        );
        let bn2 = nn::batch_norm2d(path / "bn2", out_channels, Default::default());

        let downsample = if stride != 1 || in_channels != out_channels {
            let ds_path = path / "downsample";
            let conv = nn::conv2d(
                &ds_path / 0,
                in_channels,
                out_channels,
                1,
                conv_config(0, stride),
            );
            let bn = nn::batch_norm2d(&ds_path / 1, out_channels, Default::default());
            Some((conv, bn))
        } else {
            None
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
        }
    }

    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let net = input
            .apply(&self.conv1)
            .apply_t(&self.bn1, train)
            .relu()
            .apply(&self.conv2)
            .apply_t(&self.bn2, train);

        let identity = match &self.downsample {
            Some((conv, bn)) => input.apply(conv).apply_t(bn, train),
            None => input.shallow_clone(),
        };

        (net + identity).relu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_scale_features() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let encoder = PoseEncoderInit::new(18, 2).build(vs.root()).unwrap();

        let images = Tensor::rand(&[2, 6, 64, 96], (Kind::Float, Device::Cpu));
        let features = encoder.forward_t(&images, false);

        let shapes = features.iter().map(|f| f.size()).collect::<Vec<_>>();
        assert_eq!(
            shapes,
            vec![
                vec![2, 64, 32, 48],
                vec![2, 64, 16, 24],
                vec![2, 128, 8, 12],
                vec![2, 256, 4, 6],
                vec![2, 512, 2, 3],
            ]
        );
        assert_eq!(
            features.iter().map(|f| f.size()[1]).collect::<Vec<_>>(),
            encoder.num_ch_enc()
        );
    }

    #[test]
    fn torchvision_parameter_names() {
        let vs = VarStore::new(Device::Cpu);
        let _encoder = PoseEncoderInit::new(34, 1).build(vs.root()).unwrap();

        let names = vs.variables().into_keys().collect::<HashSet<_>>();
        for name in [
            "encoder.conv1.weight",
            "encoder.bn1.running_mean",
            "encoder.layer1.2.conv2.weight",
            "encoder.layer2.0.downsample.0.weight",
            "encoder.layer3.5.bn2.weight",
            "encoder.layer4.0.downsample.1.bias",
        ] {
            assert!(names.contains(name), "missing parameter {}", name);
        }
        assert!(!names.contains("encoder.layer1.0.downsample.0.weight"));
    }

    #[test]
    fn reject_unsupported_depth() {
        let vs = VarStore::new(Device::Cpu);
        assert!(PoseEncoderInit::new(50, 2).build(vs.root()).is_err());
        assert!(PoseEncoderInit::new(18, 0).build(vs.root()).is_err());
    }
}
