use std::io::Cursor;

use derive_more::Display;
use image::{imageops::FilterType, ImageFormat, ImageReader};

use crate::entities::preset::ImagePreset;

#[derive(Debug, Display)]
pub enum TransformError {
    #[display("Unrecognised image format")]
    UnknownFormat,

    #[display("Failed to decode image: {_0}")]
    Decode(String),

    #[display("Failed to encode image: {_0}")]
    Encode(String),

    #[display("Invalid preset dimensions: {_0}")]
    InvalidPreset(String),
}

/// Output size for a preset applied to a `(width, height)` source.
///
/// Returns `None` when the preset has no dimensions and the source should be
/// served as is. A single dimension keeps the aspect ratio; both are applied
/// as given.
pub fn target_dimensions(
    (src_width, src_height): (u32, u32),
    height: Option<i32>,
    width: Option<i32>,
) -> Result<Option<(u32, u32)>, TransformError> {
    if src_width == 0 || src_height == 0 {
        return Err(TransformError::Decode("image has no pixels".into()));
    }

    let positive = |value: i32, name: &str| -> Result<u32, TransformError> {
        u32::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| TransformError::InvalidPreset(format!("{name} must be positive, got {value}")))
    };

    let scaled = |target: u32, numerator: u32, denominator: u32| -> u32 {
        let value = (f64::from(target) * f64::from(numerator) / f64::from(denominator)).round();
        (value as u32).max(1)
    };

    match (height, width) {
        (None, None) => Ok(None),
        (Some(h), None) => {
            let h = positive(h, "height")?;
            Ok(Some((scaled(h, src_width, src_height), h)))
        }
        (None, Some(w)) => {
            let w = positive(w, "width")?;
            Ok(Some((w, scaled(w, src_height, src_width))))
        }
        (Some(h), Some(w)) => Ok(Some((positive(w, "width")?, positive(h, "height")?))),
    }
}

/// Applies `preset` to the encoded `source` image and re-encodes the result
/// in the source's own format.
pub fn transform(source: &[u8], preset: &ImagePreset) -> Result<Vec<u8>, TransformError> {
    let reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| TransformError::Decode(e.to_string()))?;
    let format = reader.format().ok_or(TransformError::UnknownFormat)?;

    let dimensions = reader
        .into_dimensions()
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    let Some((width, height)) = target_dimensions(dimensions, preset.height, preset.width)? else {
        return Ok(source.to_vec());
    };

    let decoded = image::load_from_memory_with_format(source, format)
        .map_err(|e| TransformError::Decode(e.to_string()))?;
    let resized = decoded.resize_exact(width, height, FilterType::Lanczos3);

    encode(&resized, format)
}

fn encode(image: &image::DynamicImage, format: ImageFormat) -> Result<Vec<u8>, TransformError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}
