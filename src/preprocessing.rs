//! Preprocessing of uploaded images into the input tensor shared by every model in the registry.
//! All models, primary and attribute alike, were trained on the same input contract:
//! RGB, squashed (not cropped or letterboxed) to 224x224, scaled to [0, 1], NHWC with a batch of 1.

use image::{imageops::{self, FilterType}, RgbImage};
use ndarray::{Array4, ArrayView4};

use crate::error::Result;

pub const IMAGE_INPUT_SIZE: usize = 224;
pub const CHANNELS: usize = 3;
pub const INPUT_SHAPE: [usize; 4] = [1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS];

/// A normalized image of shape (1, 224, 224, 3) with values in [0, 1].
/// The shape is fixed; there is no way to construct a tensor of any other shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor
{
	/// An all-black input, used to probe a model's output dimensionality at startup.
	pub fn zeros() -> Self
	{
		ImageTensor(Array4::zeros(INPUT_SHAPE))
	}

	pub fn view(&self) -> ArrayView4<'_, f32>
	{
		self.0.view()
	}

	pub fn shape(&self) -> &[usize]
	{
		self.0.shape()
	}

	/// The values in row-major (N, H, W, C) order, ready to hand to an inference runtime.
	pub fn to_vec(&self) -> Vec<f32>
	{
		self.0.iter().copied().collect()
	}
}

/// Decodes arbitrary encoded image bytes and converts them to an ImageTensor.
/// Alpha and palette information is discarded; any aspect ratio is squashed to square.
pub fn load_image_bytes(bytes: &[u8]) -> Result<ImageTensor>
{
	let img = image::load_from_memory(bytes)?;
	Ok(image_to_tensor(&img.to_rgb8()))
}

/// Resizes an RGB image to the model input size and scales it to [0, 1].
pub fn image_to_tensor(img: &RgbImage) -> ImageTensor
{
	// CatmullRom is a bicubic filter; deterministic for identical input.
	let resized = imageops::resize(
		img,
		IMAGE_INPUT_SIZE as u32,
		IMAGE_INPUT_SIZE as u32,
		FilterType::CatmullRom);

	let mut image_input = Array4::zeros(INPUT_SHAPE);
	for (x, y, pixel) in resized.enumerate_pixels() {
		let x = x as usize;
		let y = y as usize;
		let [r, g, b] = pixel.0;
		image_input[[0, y, x, 0]] = (r as f32) / 255.;
		image_input[[0, y, x, 1]] = (g as f32) / 255.;
		image_input[[0, y, x, 2]] = (b as f32) / 255.;
	}

	ImageTensor(image_input)
}
