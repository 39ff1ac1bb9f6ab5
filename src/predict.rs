use crate::{
    common::*,
    config::Config,
    geometry,
    model::{PairPose, PoseNet, PoseNetInit},
};

// output types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativePose {
    pub frame_id: i64,
    pub axisangle: [f32; 3],
    pub translation: [f32; 3],
    pub transform: [[f32; 4]; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePoses {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub poses: Vec<RelativePose>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Index of the frame placed at the origin.
    pub start: usize,
    /// Camera-to-world matrices of consecutive frames.
    pub poses: Vec<[[f32; 4]; 4]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePoses {
    pub frames: Vec<FramePoses>,
    pub trajectory: Option<Trajectory>,
}

pub struct PosePredictor {
    vs: VarStore,
    net: PoseNet,
    device: Device,
    frame_ids: Vec<i64>,
    batch_size: usize,
}

impl PosePredictor {
    pub fn new(config: &Config) -> Fallible<Self> {
        let Config {
            ref model_file,
            device,
            ref model,
            ref input,
            ..
        } = *config;

        let mut vs = VarStore::new(device);
        let net = PoseNetInit {
            kind: model.kind,
            num_layers: model.num_layers,
            stride: model.stride,
        }
        .build(vs.root())?;

        match model_file {
            Some(path) => {
                info!("loading model weights from {}", path.display());
                vs.load(path)?;
            }
            None => warn!("model_file is not set, the pose network is randomly initialized"),
        }
        vs.freeze();

        Ok(Self {
            vs,
            net,
            device,
            frame_ids: input.frame_ids.clone(),
            batch_size: input.batch_size.get(),
        })
    }

    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }

    pub fn net(&self) -> &PoseNet {
        &self.net
    }

    /// Indices of frames that have every neighbor named in `frame_ids`.
    pub fn target_indices(&self, num_frames: usize) -> Vec<usize> {
        (0..num_frames)
            .filter(|&index| {
                self.frame_ids.iter().all(|&offset| {
                    let neighbor = index as i64 + offset;
                    neighbor >= 0 && neighbor < num_frames as i64
                })
            })
            .collect()
    }

    /// Predicts poses for a sequence of `[3, height, width]` frames.
    pub fn predict_sequence(&self, frames: &[Tensor]) -> Fallible<SequencePoses> {
        let targets = self.target_indices(frames.len());
        if targets.is_empty() {
            warn!(
                "{} frames are too few for frame_ids {:?}",
                frames.len(),
                self.frame_ids
            );
        }

        let mut results = vec![];
        for chunk in &targets.iter().copied().chunks(self.batch_size) {
            let indices = chunk.collect::<Vec<_>>();
            debug!("predicting poses for frames {:?}", indices);

            let batch: HashMap<i64, Tensor> = self
                .frame_ids
                .iter()
                .map(|&offset| {
                    let images = indices
                        .iter()
                        .map(|&index| &frames[(index as i64 + offset) as usize])
                        .collect::<Vec<_>>();
                    (offset, Tensor::stack(&images, 0).to_device(self.device))
                })
                .collect();

            let pair_poses =
                tch::no_grad(|| self.net.predict_poses(&batch, &self.frame_ids, false))?;

            for (batch_index, &index) in indices.iter().enumerate() {
                let poses = pair_poses
                    .iter()
                    .map(|pair| relative_pose(pair, batch_index as i64))
                    .collect::<Fallible<Vec<_>>>()?;
                results.push(FramePoses {
                    index,
                    path: None,
                    poses,
                });
            }
        }

        let trajectory = self.trajectory(&results)?;
        info!("predicted poses for {} frames", results.len());

        Ok(SequencePoses {
            frames: results,
            trajectory,
        })
    }

    /// Chains the poses towards the next frame into a trajectory.
    fn trajectory(&self, frames: &[FramePoses]) -> Fallible<Option<Trajectory>> {
        if !self.frame_ids.contains(&1) {
            return Ok(None);
        }
        let start = match frames.first() {
            Some(frame) => frame.index,
            None => return Ok(None),
        };

        let relatives = frames
            .iter()
            .map(|frame| {
                let pose = frame
                    .poses
                    .iter()
                    .find(|pose| pose.frame_id == 1)
                    .ok_or_else(|| format_err!("frame {} has no pose to the next frame", frame.index))?;
                let flat = pose.transform.iter().flatten().copied().collect::<Vec<_>>();
                Ok(Tensor::of_slice(flat.as_slice()).view([4, 4]))
            })
            .collect::<Fallible<Vec<_>>>()?;

        let poses = geometry::accumulate_trajectory(&relatives)
            .iter()
            .map(tensor_to_mat4)
            .collect::<Fallible<Vec<_>>>()?;

        Ok(Some(Trajectory { start, poses }))
    }
}

fn relative_pose(pair: &PairPose, batch_index: i64) -> Fallible<RelativePose> {
    let PairPose {
        frame_id,
        axisangle,
        translation,
        cam_t_cam,
    } = pair;

    Ok(RelativePose {
        frame_id: *frame_id,
        axisangle: tensor_to_vec3(&axisangle.get(batch_index).select(0, 0))?,
        translation: tensor_to_vec3(&translation.get(batch_index).select(0, 0))?,
        transform: tensor_to_mat4(&cam_t_cam.get(batch_index))?,
    })
}

fn tensor_to_vec(tensor: &Tensor) -> Vec<f32> {
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1]);
    Vec::<f32>::from(&flat)
}

fn tensor_to_vec3(tensor: &Tensor) -> Fallible<[f32; 3]> {
    tensor_to_vec(tensor)
        .try_into()
        .map_err(|values: Vec<f32>| format_err!("expect 3 values, but get {}", values.len()))
}

fn tensor_to_mat4(tensor: &Tensor) -> Fallible<[[f32; 4]; 4]> {
    let values = tensor_to_vec(tensor);
    ensure!(
        values.len() == 16,
        "expect a 4x4 matrix, but get {} values",
        values.len()
    );

    let mut mat = [[0f32; 4]; 4];
    mat.iter_mut()
        .zip(values.chunks(4))
        .for_each(|(row, values)| row.copy_from_slice(values));
    Ok(mat)
}
