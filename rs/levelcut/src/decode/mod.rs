//! Frame decoding.
//!
//! The engine follows a simple pipeline:
//! 1. [DecodeEngine::configure] a [Decoder] backend from the [CodecConfig]
//! 2. [DecodeEngine::submit] each [EncodedSample] in decode order
//! 3. [DecodeEngine::drain] to flush whatever the backend is holding back
//!
//! Decoded frames are pushed into a bounded channel as they become available.
//! Submitting blocks while the channel is full, so the engine is meant to run on a blocking thread.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{CodecConfig, EncodedSample, Timestamp, VideoFrame};

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::*;

/// An H.264 Constrained Baseline, level 3.1 avcC record with one SPS and one PPS.
///
/// Used when the container doesn't provide a decoder configuration record.
pub const FALLBACK_AVCC: [u8; 45] = [
	0x01, 0x42, 0xC0, 0x1F, 0xFF, 0xE1, 0x00, 0x16, 0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xEC, 0x04,
	0x4B, 0xCB, 0x0C, 0x0C, 0x0F, 0x10, 0x00, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0xCA, 0x3C, 0x58,
	0xBA, 0x80, 0x01, 0x00, 0x04, 0x68, 0xCE, 0x3C, 0x80,
];

/// Errors that can occur during decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("failed to initialize decoder: {0}")]
	InitError(String),

	#[error("failed to decode frame: {0}")]
	DecodeError(String),

	#[error("unsupported codec: {0}")]
	UnsupportedCodec(String),

	#[error("invalid frame data: {0}")]
	InvalidData(String),

	#[error("frame out of order: {timestamp} after {previous}")]
	OutOfOrder { timestamp: Timestamp, previous: Timestamp },

	#[error("decoder not configured")]
	NotConfigured,

	#[error("drain failed: {0}")]
	Drain(String),

	#[error("frame receiver closed")]
	Closed,
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Trait for stateful decoders that convert encoded samples to raw frames.
///
/// Samples are fed in decode order; frames come back in presentation order, possibly delayed.
pub trait Decoder: Send {
	/// Open the decoder for the given configuration.
	fn configure(&mut self, config: &CodecConfig) -> Result<()>;

	/// Decode one sample, returning any frames that became available.
	fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<VideoFrame>>;

	/// Flush any buffered frames.
	///
	/// The decoder must accept new samples afterwards.
	fn flush(&mut self) -> Result<Vec<VideoFrame>>;
}

/// Messages from the decode thread to the presentation driver.
#[derive(Debug)]
pub enum DecodeEvent {
	Frame(VideoFrame),

	/// Every sample was submitted; the remaining frames are being flushed.
	Draining,
}

/// Feeds a [Decoder] and forwards its frames, enforcing presentation order.
pub struct DecodeEngine<D: Decoder> {
	backend: D,
	output: mpsc::Sender<DecodeEvent>,
	configured: bool,
	previous: Option<Timestamp>,
	emitted: u64,
}

impl<D: Decoder> DecodeEngine<D> {
	pub fn new(backend: D, output: mpsc::Sender<DecodeEvent>) -> Self {
		Self {
			backend,
			output,
			configured: false,
			previous: None,
			emitted: 0,
		}
	}

	/// Open the backend, substituting [FALLBACK_AVCC] if an H.264 stream has no configuration record.
	pub fn configure(&mut self, mut config: CodecConfig) -> Result<()> {
		let avc = config.codec.starts_with("avc1") || config.codec.starts_with("avc3");
		if avc && config.description.is_none() {
			tracing::warn!(codec = %config.codec, "missing decoder configuration, using fallback");
			config.description = Some(Bytes::from_static(&FALLBACK_AVCC));
		}

		self.backend.configure(&config)?;
		self.configured = true;

		tracing::debug!(codec = %config.codec, "decoder configured");
		Ok(())
	}

	/// Decode a sample, blocking while the output channel is full.
	pub fn submit(&mut self, sample: EncodedSample) -> Result<()> {
		if !self.configured {
			return Err(DecodeError::NotConfigured);
		}

		let frames = self.backend.decode(&sample)?;
		self.emit(frames)
	}

	/// Flush every in-flight sample, blocking while the output channel is full.
	pub fn drain(&mut self) -> Result<()> {
		if !self.configured {
			return Err(DecodeError::NotConfigured);
		}

		self.send(DecodeEvent::Draining)?;

		let frames = self.backend.flush().map_err(|err| match err {
			DecodeError::Closed => DecodeError::Closed,
			err => DecodeError::Drain(err.to_string()),
		})?;

		self.emit(frames)?;

		tracing::debug!(emitted = self.emitted, "decoder drained");
		Ok(())
	}

	/// Submit every sample then drain, returning the number of frames emitted.
	pub fn run(mut self, samples: impl IntoIterator<Item = EncodedSample>) -> Result<u64> {
		for sample in samples {
			self.submit(sample)?;
		}

		self.drain()?;
		Ok(self.emitted)
	}

	pub fn emitted(&self) -> u64 {
		self.emitted
	}

	fn emit(&mut self, frames: Vec<VideoFrame>) -> Result<()> {
		for frame in frames {
			if let Some(previous) = self.previous.filter(|previous| frame.timestamp < *previous) {
				return Err(DecodeError::OutOfOrder {
					timestamp: frame.timestamp,
					previous,
				});
			}

			self.previous = Some(frame.timestamp);
			self.send(DecodeEvent::Frame(frame))?;
			self.emitted += 1;
		}

		Ok(())
	}

	fn send(&self, event: DecodeEvent) -> Result<()> {
		self.output.blocking_send(event).map_err(|_| DecodeError::Closed)
	}
}
