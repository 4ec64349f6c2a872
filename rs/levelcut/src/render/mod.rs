//! Frame rendering for the presentation clock.
//!
//! The renderer follows a simple pipeline:
//! 1. Receive a due [VideoFrame] from the [crate::Scheduler]
//! 2. Draw it onto a surface owned by the render target
//! 3. Let the sampler [RenderTarget::capture] whatever is currently on screen
//!
//! [Canvas] is a headless target that keeps a grayscale copy of the last frame, which is all recognition needs.

use crate::VideoFrame;
use thiserror::Error;

mod canvas;
mod filter;

pub use canvas::*;
pub use filter::*;

/// A grayscale snapshot of the rendered output.
pub type Bitmap = image::GrayImage;

/// Errors that can occur during rendering.
///
/// These are never fatal; the frame is released either way.
#[derive(Debug, Error)]
pub enum RenderError {
	#[error("failed to render frame: {0}")]
	RenderError(String),

	#[error("unsupported format: {0}")]
	UnsupportedFormat(String),
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Trait for targets that display video frames.
pub trait RenderTarget: Send {
	/// Render a video frame to the display.
	fn render(&mut self, frame: &VideoFrame) -> Result<()>;

	/// Resize the render target.
	fn resize(&mut self, width: u32, height: u32) -> Result<()>;

	/// Snapshot the currently displayed image, if anything was rendered yet.
	fn capture(&self) -> Option<Bitmap>;
}
