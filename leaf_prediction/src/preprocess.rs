use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, Array4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error decoding image: {0}")]
    Decode(String),
    #[error("Image has no pixels")]
    EmptyImage,
}

/// Target geometry of the model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    pub normalize: bool,
}

pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let img = image_reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    if img.width() == 0 || img.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    Ok(img)
}

/// Decodes raw upload bytes into a `(1, height, width, 3)` RGB tensor.
///
/// Any decodable image is accepted: alpha is dropped, grayscale is expanded to
/// three channels and images whose size differs from the model input are
/// resized.
pub fn image_to_tensor(
    image_data: &[u8],
    shape: InputShape,
) -> Result<Array4<f32>, PreprocessError> {
    let original_img = decode_image(image_data)?;

    let (img_width, img_height) = original_img.dimensions();
    let img = if (img_width, img_height) == (shape.width, shape.height) {
        original_img
    } else {
        tracing::debug!(
            "Resizing image from {}x{} to {}x{}",
            img_width,
            img_height,
            shape.width,
            shape.height
        );
        original_img.resize_exact(shape.width, shape.height, FilterType::CatmullRom)
    };

    let rgb = img.to_rgb8();
    let scale = if shape.normalize { 1. / 255. } else { 1. };

    let mut input = Array::zeros((1, shape.height as usize, shape.width as usize, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, y, x, 0]] = r as f32 * scale;
        input[[0, y, x, 1]] = g as f32 * scale;
        input[[0, y, x, 2]] = b as f32 * scale;
    }

    Ok(input)
}
