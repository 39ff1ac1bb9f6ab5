use monopose::{common::*, config::Config, data, predict::PosePredictor};

/// Predicts camera motion between video frames with a monocular pose network.
#[derive(FromArgs)]
struct Args {
    /// the config file.
    #[argh(option, default = "PathBuf::from(\"config.json5\")")]
    config: PathBuf,
}

fn main() -> Fallible<()> {
    pretty_env_logger::init();

    // Parse arguments
    let args: Args = argh::from_env();

    // load config
    let config = Config::open(&args.config)?;

    // Load frames
    let paths = data::list_frames(&config.input.frames)?;
    info!("loading {} frames", paths.len());
    let frames = data::load_frames(&paths, config.model.height, config.model.width)?;

    // Predict poses
    let predictor = PosePredictor::new(&config)?;
    let mut poses = predictor.predict_sequence(&frames)?;
    for frame in &mut poses.frames {
        frame.path = paths.get(frame.index).cloned();
    }

    match &config.output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, &poses)?;
            info!("poses are written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &poses)?;
            writeln!(stdout.lock())?;
        }
    }

    Ok(())
}
