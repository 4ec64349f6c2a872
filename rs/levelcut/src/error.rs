use std::sync::Arc;

use crate::decode::DecodeError;

/// A fatal pipeline error.
///
/// Recoverable conditions (recognition and render failures) have their own types and never surface here.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("no video track")]
	NoVideoTrack,

	#[error("unsupported codec: {0}")]
	UnsupportedCodec(String),

	#[error("decode error: {0}")]
	Decode(String),

	#[error("drain failed: {0}")]
	Drain(String),

	#[error("demux error: {0}")]
	Demux(String),

	#[error("pipeline is busy")]
	Busy,

	#[error("pipeline already ran")]
	Finished,

	#[error("cancelled")]
	Cancel,

	#[error("transcode of segment {index} failed: {reason}")]
	Transcode { index: usize, reason: String },

	#[error("io error: {0}")]
	Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(Arc::new(err))
	}
}

impl From<DecodeError> for Error {
	fn from(err: DecodeError) -> Self {
		match err {
			DecodeError::UnsupportedCodec(codec) => Self::UnsupportedCodec(codec),
			DecodeError::Drain(reason) => Self::Drain(reason),
			DecodeError::Closed => Self::Cancel,
			err => Self::Decode(err.to_string()),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
