use crate::common::*;

/// Expands a glob pattern into frame paths in lexicographic order.
pub fn list_frames(pattern: &str) -> Fallible<Vec<PathBuf>> {
    let mut paths = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    ensure!(!paths.is_empty(), r#"no frames match "{}""#, pattern);
    Ok(paths)
}

/// Decodes an image into a `[3, height, width]` float tensor in `[0, 1]`.
pub fn load_frame<P>(path: P, height: i64, width: i64) -> Fallible<Tensor>
where
    P: AsRef<Path>,
{
    let image = ImageReader::open(path.as_ref())?
        .with_guessed_format()?
        .decode()?;
    Ok(image_to_tensor(&image, height, width))
}

pub fn load_frames(paths: &[PathBuf], height: i64, width: i64) -> Fallible<Vec<Tensor>> {
    paths
        .par_iter()
        .map(|path| {
            debug!("loading frame {}", path.display());
            load_frame(path, height, width)
        })
        .collect()
}

fn image_to_tensor(image: &DynamicImage, height: i64, width: i64) -> Tensor {
    let rgb = image
        .resize_exact(width as u32, height as u32, FilterType::Lanczos3)
        .to_rgb8();
    let raw = rgb.into_raw();

    Tensor::of_slice(raw.as_slice())
        .view([height, width, 3])
        .permute(&[2, 0, 1])
        .to_kind(Kind::Float)
        / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn frames_are_sorted_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        for (name, color) in [("b.png", [0, 255, 0]), ("a.png", [255, 0, 0])] {
            RgbImage::from_pixel(20, 10, Rgb(color))
                .save(dir.path().join(name))
                .unwrap();
        }

        let pattern = format!("{}/*.png", dir.path().display());
        let paths = list_frames(&pattern).unwrap();
        assert_eq!(
            paths
                .iter()
                .map(|path| path.file_name().unwrap().to_str().unwrap())
                .collect::<Vec<_>>(),
            vec!["a.png", "b.png"]
        );

        let frames = load_frames(&paths, 32, 64).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].size(), vec![3, 32, 64]);
        assert_eq!(frames[0].kind(), Kind::Float);

        // a.png is pure red
        assert!((frames[0].double_value(&[0, 5, 5]) - 1.0).abs() < 1e-4);
        assert!(frames[0].double_value(&[1, 5, 5]).abs() < 1e-4);
        assert!((frames[1].double_value(&[1, 5, 5]) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.png", dir.path().display());
        assert!(list_frames(&pattern).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_frame(dir.path().join("missing.png"), 32, 32).is_err());
    }
}
