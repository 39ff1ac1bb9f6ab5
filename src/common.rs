pub use anyhow::{bail, ensure, format_err, Error, Result as Fallible};
pub use argh::FromArgs;
pub use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
pub use itertools::Itertools;
pub use log::{debug, error, info, warn};
pub use rayon::prelude::*;
pub use serde::{
    de::Error as DeserializeError, Deserialize, Deserializer, Serialize, Serializer,
};
pub use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{prelude::*, BufWriter},
    iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use tch::{
    nn::{self, BatchNorm, Conv2D, ConvConfig, ModuleT, VarStore},
    Device, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;
