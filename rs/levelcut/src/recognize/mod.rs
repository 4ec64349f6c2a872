//! Text recognition seam.
//!
//! Recognition is slow and unreliable; every failure is recoverable and treated as "no text".

use std::future::Future;

use tokio::time::Instant;

use crate::Bitmap;

mod tesseract;

pub use tesseract::*;

/// Errors from a single recognition request.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
	#[error("failed to spawn {program}: {source}")]
	Spawn { program: String, source: std::io::Error },

	#[error("{program} exited with {status}: {stderr}")]
	Failed { program: String, status: String, stderr: String },

	#[error("{program} timed out")]
	Timeout { program: String },

	#[error("failed to encode bitmap: {0}")]
	Encode(#[from] image::ImageError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Something that reads text from a bitmap.
pub trait Recognizer: Send + Sync + 'static {
	fn recognize(&self, bitmap: Bitmap) -> impl Future<Output = Result<String, RecognitionError>> + Send;
}

/// The text recognized from one capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionSample {
	/// The instant the bitmap was captured, not when recognition finished.
	pub captured_at: Instant,

	/// The recognized text, empty on failure.
	pub text: String,
}
