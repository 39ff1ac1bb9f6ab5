use crate::{common::*, model::PoseModelKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model_file: Option<PathBuf>,
    #[serde(
        serialize_with = "serialize_device",
        deserialize_with = "deserialize_device",
        default = "default_device"
    )]
    pub device: Device,
    pub model: ModelConfig,
    pub input: InputConfig,
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn open<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Fallible<Self> {
        let config: Self = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Fallible<()> {
        let ModelConfig { height, width, .. } = self.model;
        ensure!(
            height > 0 && height % 32 == 0,
            "height must be a positive multiple of 32, but get {}",
            height
        );
        ensure!(
            width > 0 && width % 32 == 0,
            "width must be a positive multiple of 32, but get {}",
            width
        );

        let frame_ids = &self.input.frame_ids;
        ensure!(
            frame_ids.first() == Some(&0),
            "frame_ids must start with 0, but get {:?}",
            frame_ids
        );
        ensure!(
            frame_ids.iter().collect::<HashSet<_>>().len() == frame_ids.len(),
            "frame_ids must not contain duplicates, but get {:?}",
            frame_ids
        );
        if frame_ids.len() < 2 {
            warn!("frame_ids contains only the target frame, no pose will be predicted");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: PoseModelKind,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_stride")]
    pub stride: i64,
    #[serde(default = "default_height")]
    pub height: i64,
    #[serde(default = "default_width")]
    pub width: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Glob pattern of the frame images, sorted by path.
    pub frames: String,
    #[serde(default = "default_frame_ids")]
    pub frame_ids: Vec<i64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
}

fn default_num_layers() -> usize {
    18
}

fn default_stride() -> i64 {
    1
}

fn default_height() -> i64 {
    192
}

fn default_width() -> i64 {
    640
}

fn default_frame_ids() -> Vec<i64> {
    vec![0, -1, 1]
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(1).unwrap()
}

fn default_device() -> Device {
    Device::cuda_if_available()
}

fn serialize_device<S>(device: &Device, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = match device {
        Device::Cpu => "cpu".into(),
        Device::Cuda(n) => format!("cuda({})", n),
    };
    text.serialize(serializer)
}

fn deserialize_device<'de, D>(deserializer: D) -> Result<Device, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    let device = match name.as_str() {
        "cpu" => Device::Cpu,
        _ => {
            let prefix = "cuda(";
            let suffix = ")";
            if name.starts_with(prefix) && name.ends_with(suffix) {
                let number: usize = name[(prefix.len())..(name.len() - suffix.len())]
                    .parse()
                    .map_err(|_err| D::Error::custom(format!("invalid device name {}", name)))?;
                Device::Cuda(number)
            } else {
                return Err(D::Error::custom(format!("invalid device name {}", name)));
            }
        }
    };

    Ok(device)
}
