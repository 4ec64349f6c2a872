use bytes::Bytes;

use super::{Timestamp, TimestampOverflow};

/// One encoded access unit, in decode order.
#[derive(Clone, Debug)]
pub struct EncodedSample {
	/// The decode timestamp in `timescale` units.
	pub decode_timestamp: u64,

	/// The offset from the decode timestamp to the presentation timestamp, in `timescale` units.
	///
	/// Zero unless the track reorders frames.
	pub composition_offset: i64,

	/// The number of units per second.
	pub timescale: u64,

	/// Whether the sample can be decoded without prior samples.
	pub keyframe: bool,

	/// The encoded bitstream.
	pub payload: Bytes,
}

impl EncodedSample {
	/// The decode timestamp converted to microseconds.
	pub fn decode_time(&self) -> Result<Timestamp, TimestampOverflow> {
		Timestamp::from_scale(self.decode_timestamp, self.timescale)
	}

	/// The presentation timestamp converted to microseconds, clamped at zero.
	pub fn presentation_time(&self) -> Result<Timestamp, TimestampOverflow> {
		let pts = self.decode_timestamp.saturating_add_signed(self.composition_offset);
		Timestamp::from_scale(pts, self.timescale)
	}
}

/// The configuration needed to open a decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
	/// A codec string, ex. `avc1.42c01f`.
	pub codec: String,

	/// The out-of-band decoder configuration record (avcC, hvcC, ...).
	pub description: Option<Bytes>,
}

impl CodecConfig {
	pub fn new(codec: impl Into<String>) -> Self {
		Self {
			codec: codec.into(),
			description: None,
		}
	}

	pub fn with_description(mut self, description: impl Into<Bytes>) -> Self {
		self.description = Some(description.into());
		self
	}
}
