use bytes::{Bytes, BytesMut};
use mp4_atom::{Any, Atom, DecodeMaybe, Moov, StszSamples, Trak};

use super::{Demuxed, SampleSource, SampleTable};
use crate::{CodecConfig, Error, Result};

/// Demuxes progressive (non-fragmented) MP4 files.
///
/// Only the first video track is used; audio and other tracks are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mp4Source;

impl SampleSource for Mp4Source {
	fn demux(&self, input: Bytes) -> Result<Demuxed> {
		let moov = read_moov(&input)?;

		let trak = moov
			.trak
			.iter()
			.find(|trak| trak.mdia.hdlr.handler == b"vide".into())
			.ok_or(Error::NoVideoTrack)?;

		let codec = codec_config(trak)?;
		let samples = sample_table(trak).resolve(&input)?;
		let duration_ms = duration_ms(&moov, trak);

		tracing::info!(
			codec = %codec.codec,
			samples = samples.len(),
			duration_ms,
			track = trak.tkhd.track_id,
			"demuxed video track"
		);

		Ok(Demuxed {
			codec,
			duration_ms,
			samples,
		})
	}
}

fn read_moov(input: &Bytes) -> Result<Moov> {
	let mut cursor = std::io::Cursor::new(input.as_ref());

	while let Some(atom) = Any::decode_maybe(&mut cursor).map_err(|e| Error::Demux(e.to_string()))? {
		if let Any::Moov(moov) = atom {
			return Ok(moov);
		}
	}

	Err(Error::Demux("missing moov".into()))
}

fn duration_ms(moov: &Moov, trak: &Trak) -> f64 {
	if moov.mvhd.timescale > 0 && moov.mvhd.duration > 0 {
		return moov.mvhd.duration as f64 / moov.mvhd.timescale as f64 * 1000.0;
	}

	let mdhd = &trak.mdia.mdhd;
	match mdhd.timescale {
		0 => 0.0,
		timescale => mdhd.duration as f64 / timescale as f64 * 1000.0,
	}
}

fn codec_config(trak: &Trak) -> Result<CodecConfig> {
	let stsd = &trak.mdia.minf.stbl.stsd;

	let codec = match stsd.codecs.len() {
		0 => return Err(Error::Demux("missing codec".into())),
		1 => &stsd.codecs[0],
		_ => return Err(Error::Demux("multiple codecs".into())),
	};

	let config = match codec {
		mp4_atom::Codec::Avc1(avc1) => {
			let avcc = &avc1.avcc;

			let mut description = BytesMut::new();
			avcc.encode_body(&mut description)
				.map_err(|e| Error::Demux(e.to_string()))?;

			CodecConfig::new(avc_codec(
				avcc.avc_profile_indication,
				avcc.profile_compatibility,
				avcc.avc_level_indication,
			))
			.with_description(description.freeze())
		}
		// There's two almost identical hvcc atoms in the wild.
		mp4_atom::Codec::Hev1(hev1) => hevc_config("hev1", &hev1.hvcc)?,
		mp4_atom::Codec::Hvc1(hvc1) => hevc_config("hvc1", &hvc1.hvcc)?,
		mp4_atom::Codec::Vp08(_) => CodecConfig::new("vp08"),
		mp4_atom::Codec::Vp09(_) => CodecConfig::new("vp09"),
		mp4_atom::Codec::Av01(_) => CodecConfig::new("av01"),
		mp4_atom::Codec::Unknown(unknown) => return Err(Error::UnsupportedCodec(format!("{:?}", unknown))),
		unsupported => return Err(Error::UnsupportedCodec(format!("{:?}", unsupported))),
	};

	Ok(config)
}

fn hevc_config(family: &str, hvcc: &mp4_atom::Hvcc) -> Result<CodecConfig> {
	let mut description = BytesMut::new();
	hvcc.encode_body(&mut description)
		.map_err(|e| Error::Demux(e.to_string()))?;

	Ok(CodecConfig::new(family).with_description(description.freeze()))
}

/// The RFC 6381 codec string for H.264, ex. `avc1.42c01f`.
fn avc_codec(profile: u8, constraints: u8, level: u8) -> String {
	format!("avc1.{:02x}{:02x}{:02x}", profile, constraints, level)
}

fn sample_table(trak: &Trak) -> SampleTable {
	let stbl = &trak.mdia.minf.stbl;

	let sizes = match &stbl.stsz.samples {
		StszSamples::Identical { count, size } => vec![*size; *count as usize],
		StszSamples::Different { sizes } => sizes.clone(),
	};

	let chunk_offsets = match (&stbl.stco, &stbl.co64) {
		(Some(stco), _) => stco.entries.iter().map(|&offset| offset as u64).collect(),
		(None, Some(co64)) => co64.entries.clone(),
		(None, None) => Vec::new(),
	};

	SampleTable {
		timescale: trak.mdia.mdhd.timescale as u64,
		stts: stbl
			.stts
			.entries
			.iter()
			.map(|entry| (entry.sample_count, entry.sample_delta))
			.collect(),
		ctts: stbl
			.ctts
			.as_ref()
			.map(|ctts| {
				ctts.entries
					.iter()
					.map(|entry| (entry.sample_count, entry.sample_offset as i32))
					.collect()
			})
			.unwrap_or_default(),
		stss: stbl.stss.as_ref().map(|stss| stss.entries.clone()),
		stsc: stbl
			.stsc
			.entries
			.iter()
			.map(|entry| (entry.first_chunk, entry.samples_per_chunk))
			.collect(),
		sizes,
		chunk_offsets,
	}
}
