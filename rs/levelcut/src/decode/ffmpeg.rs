//! Video frame decoding using FFmpeg.

use super::{DecodeError, Decoder, Result};
use crate::{CodecConfig, EncodedSample, Plane, Timestamp, VideoFormat, VideoFrame};
use ffmpeg_next as ffmpeg;
use std::sync::Arc;

// Required zeroed padding after extradata.
const PADDING: usize = ffmpeg::sys::AV_INPUT_BUFFER_PADDING_SIZE as usize;

fn format_from_ffmpeg(format: ffmpeg::format::Pixel) -> Option<VideoFormat> {
	use ffmpeg::format::Pixel;
	match format {
		Pixel::YUV420P | Pixel::YUVJ420P => Some(VideoFormat::YUV420P),
		Pixel::YUV422P | Pixel::YUVJ422P => Some(VideoFormat::YUV422P),
		Pixel::YUV444P | Pixel::YUVJ444P => Some(VideoFormat::YUV444P),
		Pixel::RGB24 => Some(VideoFormat::RGB24),
		Pixel::RGBA => Some(VideoFormat::RGBA),
		_ => None,
	}
}

/// Map a codec string (`avc1.42c01f`, `hvc1.1.6.L93.B0`, ...) to an FFmpeg codec ID.
fn codec_id(codec: &str) -> Option<ffmpeg::codec::Id> {
	let family = codec.split('.').next().unwrap_or(codec);
	match family {
		"avc1" | "avc3" => Some(ffmpeg::codec::Id::H264),
		"hvc1" | "hev1" => Some(ffmpeg::codec::Id::HEVC),
		"vp08" | "vp8" => Some(ffmpeg::codec::Id::VP8),
		"vp09" | "vp9" => Some(ffmpeg::codec::Id::VP9),
		"av01" => Some(ffmpeg::codec::Id::AV1),
		_ => None,
	}
}

/// Video decoder using FFmpeg.
///
/// Decodes compressed video samples (H.264, H.265, VP8, VP9, AV1) to raw YUV/RGB data.
#[derive(Default)]
pub struct FfmpegDecoder {
	decoder: Option<ffmpeg::decoder::Video>,
}

impl FfmpegDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	fn decoder(&mut self) -> Result<&mut ffmpeg::decoder::Video> {
		self.decoder.as_mut().ok_or(DecodeError::NotConfigured)
	}

	// Pull every frame the decoder has ready.
	fn receive(&mut self) -> Result<Vec<VideoFrame>> {
		let decoder = self.decoder()?;

		let mut frames = Vec::new();
		loop {
			let mut decoded = ffmpeg::frame::Video::empty();
			match decoder.receive_frame(&mut decoded) {
				Ok(()) => frames.push(convert(&decoded)?),
				Err(ffmpeg::Error::Eof) => break,
				Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => break,
				Err(e) => return Err(DecodeError::DecodeError(format!("receive_frame failed: {}", e))),
			}
		}

		Ok(frames)
	}
}

impl Decoder for FfmpegDecoder {
	fn configure(&mut self, config: &CodecConfig) -> Result<()> {
		// Initialize FFmpeg (idempotent)
		ffmpeg::init().map_err(|e| DecodeError::InitError(e.to_string()))?;

		let id = codec_id(&config.codec).ok_or_else(|| DecodeError::UnsupportedCodec(config.codec.clone()))?;

		// Find the decoder
		let codec = ffmpeg::codec::decoder::find(id).ok_or_else(|| DecodeError::UnsupportedCodec(format!("{:?}", id)))?;

		let mut context = ffmpeg::codec::context::Context::new_with_codec(codec);

		// The configuration record must be in place before the decoder is opened.
		if let Some(data) = &config.description {
			unsafe {
				let context = context.as_mut_ptr();
				let extradata = ffmpeg::sys::av_mallocz(data.len() + PADDING) as *mut u8;
				if extradata.is_null() {
					return Err(DecodeError::InitError("failed to allocate extradata".into()));
				}

				std::ptr::copy_nonoverlapping(data.as_ptr(), extradata, data.len());
				(*context).extradata = extradata;
				(*context).extradata_size = data.len() as i32;
			}
		}

		let decoder = context
			.decoder()
			.video()
			.map_err(|e| DecodeError::InitError(format!("not a video codec: {}", e)))?;

		self.decoder = Some(decoder);
		Ok(())
	}

	fn decode(&mut self, sample: &EncodedSample) -> Result<Vec<VideoFrame>> {
		let pts = sample.presentation_time().map_err(|e| DecodeError::InvalidData(e.to_string()))?;
		let dts = sample.decode_time().map_err(|e| DecodeError::InvalidData(e.to_string()))?;

		// Create FFmpeg packet from sample data
		let mut packet = ffmpeg::codec::packet::Packet::copy(sample.payload.as_ref());

		// Timestamps stay in microseconds; the decoder passes them through.
		packet.set_pts(Some(pts.as_micros() as i64));
		packet.set_dts(Some(dts.as_micros() as i64));
		if sample.keyframe {
			packet.set_flags(ffmpeg::codec::packet::Flags::KEY);
		}

		self.decoder()?
			.send_packet(&packet)
			.map_err(|e| DecodeError::DecodeError(format!("send_packet failed: {}", e)))?;

		self.receive()
	}

	fn flush(&mut self) -> Result<Vec<VideoFrame>> {
		// Send flush packet
		self.decoder()?
			.send_eof()
			.map_err(|e| DecodeError::DecodeError(format!("flush failed: {}", e)))?;

		let frames = self.receive()?;

		// Accept new samples again.
		self.decoder()?.flush();

		Ok(frames)
	}
}

fn convert(decoded: &ffmpeg::frame::Video) -> Result<VideoFrame> {
	let format = format_from_ffmpeg(decoded.format())
		.ok_or_else(|| DecodeError::UnsupportedCodec(format!("pixel format {:?}", decoded.format())))?;

	let plane = |i: usize| Plane {
		data: Arc::new(decoded.data(i).to_vec()),
		stride: decoded.stride(i),
	};

	let planes = match format {
		// YUV formats have 3 planes: Y, U, V
		VideoFormat::YUV420P | VideoFormat::YUV422P | VideoFormat::YUV444P => (0..3).map(plane).collect(),
		// Packed formats have 1 plane
		VideoFormat::RGB24 | VideoFormat::RGBA => vec![plane(0)],
	};

	let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0).max(0);

	Ok(VideoFrame {
		timestamp: Timestamp::from_micros(pts as u64),
		format,
		width: decoded.width(),
		height: decoded.height(),
		planes,
	})
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn decoder_is_send() {
		fn send<T: Send>() {}
		send::<FfmpegDecoder>();
	}

	#[test]
	fn codec_ids() {
		assert_eq!(codec_id("avc1.42c01f"), Some(ffmpeg::codec::Id::H264));
		assert_eq!(codec_id("hev1.1.6.L93.B0"), Some(ffmpeg::codec::Id::HEVC));
		assert_eq!(codec_id("av01.0.08M.08"), Some(ffmpeg::codec::Id::AV1));
		assert_eq!(codec_id("mp4a.40.2"), None);
	}

	#[test]
	fn unsupported() {
		let mut decoder = FfmpegDecoder::new();
		let err = decoder.configure(&CodecConfig::new("mp4a.40.2")).unwrap_err();
		assert!(matches!(err, DecodeError::UnsupportedCodec(_)));
	}
}
