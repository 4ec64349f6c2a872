//! Sources of encoded samples.
//!
//! A [SampleSource] turns raw container bytes into a [Demuxed] video track: the codec configuration,
//! the total duration, and every sample in decode order.

use bytes::Bytes;

use crate::{CodecConfig, EncodedSample, Result};

mod table;

pub use table::*;

#[cfg(feature = "mp4")]
mod mp4;

#[cfg(feature = "mp4")]
pub use mp4::*;

/// The first video track of a container.
#[derive(Clone, Debug)]
pub struct Demuxed {
	pub codec: CodecConfig,

	/// The duration of the whole presentation in milliseconds.
	pub duration_ms: f64,

	/// Samples in decode order.
	pub samples: Vec<EncodedSample>,
}

/// Demuxes container bytes.
pub trait SampleSource: Send + Sync {
	/// Extract the first video track, or [crate::Error::NoVideoTrack].
	fn demux(&self, input: Bytes) -> Result<Demuxed>;
}
