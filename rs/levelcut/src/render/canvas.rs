use image::imageops::{self, FilterType};

use super::{Bitmap, RenderError, RenderTarget, Result};
use crate::VideoFrame;

/// The default canvas width in pixels.
pub const CANVAS_WIDTH: u32 = 768;

/// The default canvas height in pixels.
pub const CANVAS_HEIGHT: u32 = 432;

/// A headless render target holding the luma of the last rendered frame, scaled to the canvas size.
#[derive(Debug)]
pub struct Canvas {
	width: u32,
	height: u32,
	surface: Option<Bitmap>,
}

impl Default for Canvas {
	fn default() -> Self {
		Self::new(CANVAS_WIDTH, CANVAS_HEIGHT)
	}
}

impl Canvas {
	pub fn new(width: u32, height: u32) -> Self {
		Self {
			width: width.max(1),
			height: height.max(1),
			surface: None,
		}
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	fn fit(&self, bitmap: Bitmap) -> Bitmap {
		if bitmap.dimensions() == (self.width, self.height) {
			return bitmap;
		}

		imageops::resize(&bitmap, self.width, self.height, FilterType::Triangle)
	}
}

impl RenderTarget for Canvas {
	fn render(&mut self, frame: &VideoFrame) -> Result<()> {
		let luma = frame
			.luma()
			.ok_or_else(|| RenderError::RenderError(format!("truncated {:?} planes", frame.format)))?;

		let bitmap = Bitmap::from_raw(frame.width, frame.height, luma)
			.ok_or_else(|| RenderError::UnsupportedFormat(format!("{}x{}", frame.width, frame.height)))?;

		self.surface = Some(self.fit(bitmap));
		Ok(())
	}

	fn resize(&mut self, width: u32, height: u32) -> Result<()> {
		if width == 0 || height == 0 {
			return Ok(());
		}

		self.width = width;
		self.height = height;
		self.surface = self.surface.take().map(|surface| self.fit(surface));

		Ok(())
	}

	fn capture(&self) -> Option<Bitmap> {
		self.surface.clone()
	}
}
