use std::sync::Arc;

use super::Timestamp;

/// Raw video frame data after decoding.
///
/// Frames are uniquely owned; dropping one (or calling [VideoFrame::close]) releases the pixel data.
#[derive(Debug)]
pub struct VideoFrame {
	/// Presentation timestamp in microseconds.
	pub timestamp: Timestamp,

	/// Pixel format (YUV420p, YUV422p, RGB24, etc.).
	pub format: VideoFormat,

	/// Frame width in pixels.
	pub width: u32,

	/// Frame height in pixels.
	pub height: u32,

	/// Pixel data organized as planes (e.g., Y, U, V for YUV formats).
	pub planes: Vec<Plane>,
}

/// Video pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
	/// YUV 4:2:0 planar (most common for video codecs)
	YUV420P,
	/// YUV 4:2:2 planar
	YUV422P,
	/// YUV 4:4:4 planar
	YUV444P,
	/// RGB24 packed
	RGB24,
	/// RGBA packed
	RGBA,
}

/// A single plane of pixel data.
#[derive(Debug, Clone)]
pub struct Plane {
	/// Raw pixel data for this plane.
	pub data: Arc<Vec<u8>>,

	/// Number of bytes between rows (may include padding).
	pub stride: usize,
}

impl VideoFrame {
	/// Release the pixel data.
	pub fn close(self) {}

	/// Extract the luma channel as a tightly packed, row-major buffer.
	///
	/// Returns [None] if the planes are too small for the frame dimensions.
	pub fn luma(&self) -> Option<Vec<u8>> {
		let width = self.width as usize;
		let height = self.height as usize;
		let plane = self.planes.first()?;

		let bytes_per_pixel = match self.format {
			VideoFormat::YUV420P | VideoFormat::YUV422P | VideoFormat::YUV444P => 1,
			VideoFormat::RGB24 => 3,
			VideoFormat::RGBA => 4,
		};

		let row = width * bytes_per_pixel;
		if height == 0 || plane.stride < row || plane.data.len() < plane.stride * (height - 1) + row {
			return None;
		}

		let mut out = Vec::with_capacity(width * height);
		for y in 0..height {
			let line = &plane.data[y * plane.stride..y * plane.stride + row];
			match bytes_per_pixel {
				1 => out.extend_from_slice(line),
				n => out.extend(line.chunks_exact(n).map(|px| luma(px[0], px[1], px[2]))),
			}
		}

		Some(out)
	}
}

// BT.601 weights.
fn luma(r: u8, g: u8, b: u8) -> u8 {
	(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}
