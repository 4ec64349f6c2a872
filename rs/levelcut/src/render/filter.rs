use image::imageops;

use super::Bitmap;

// 1-2-1 / 2-4-2 / 1-2-1, normalized by the kernel sum.
const BLUR: [f32; 9] = [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0];

/// Makes bright on-screen text stand out for the recognizer.
///
/// Pixels brighter than the threshold become white, everything else black, then the edges are softened.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Legibility {
	/// Normalized luma threshold in `0.0..=1.0`.
	pub threshold: f32,
}

impl Default for Legibility {
	fn default() -> Self {
		Self { threshold: 0.75 }
	}
}

impl Legibility {
	pub fn apply(&self, bitmap: &Bitmap) -> Bitmap {
		let cutoff = self.threshold * 255.0;

		let mut binary = bitmap.clone();
		for pixel in binary.pixels_mut() {
			pixel[0] = if pixel[0] as f32 > cutoff { 255 } else { 0 };
		}

		imageops::filter3x3(&binary, &BLUR)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use image::Luma;

	#[test]
	fn threshold() {
		let bitmap = Bitmap::from_fn(8, 8, |x, _| if x < 4 { Luma([150]) } else { Luma([230]) });
		let filtered = Legibility::default().apply(&bitmap);

		assert_eq!(filtered.dimensions(), (8, 8));
		assert_eq!(filtered.get_pixel(1, 4)[0], 0);
		assert_eq!(filtered.get_pixel(6, 4)[0], 255);

		// The boundary is blurred.
		let edge = filtered.get_pixel(4, 4)[0];
		assert!(edge > 0 && edge < 255);
	}
}
