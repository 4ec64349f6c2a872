use bytes::Bytes;

use crate::{EncodedSample, Error, Result};

/// The sample tables of one progressive MP4 track, flattened out of their boxes.
///
/// Chunk numbers in `stsc` and sample numbers in `stss` are 1-based, as stored.
#[derive(Clone, Debug, Default)]
pub struct SampleTable {
	/// Units per second.
	pub timescale: u64,

	/// (sample_count, sample_delta) runs.
	pub stts: Vec<(u32, u32)>,

	/// (sample_count, composition_offset) runs.
	pub ctts: Vec<(u32, i32)>,

	/// Sync samples; [None] means every sample is a keyframe.
	pub stss: Option<Vec<u32>>,

	/// (first_chunk, samples_per_chunk) runs.
	pub stsc: Vec<(u32, u32)>,

	/// Per-sample sizes.
	pub sizes: Vec<u32>,

	/// Absolute file offset of each chunk.
	pub chunk_offsets: Vec<u64>,
}

impl SampleTable {
	/// Resolve every sample against the file, in decode order.
	///
	/// Payloads are zero-copy slices of `file`.
	pub fn resolve(&self, file: &Bytes) -> Result<Vec<EncodedSample>> {
		let count = self.sizes.len();

		let mut decode_timestamps = Vec::with_capacity(count);
		let mut dts = 0u64;
		for &(run, delta) in &self.stts {
			for _ in 0..run {
				if decode_timestamps.len() >= count {
					break;
				}

				decode_timestamps.push(dts);
				dts += delta as u64;
			}
		}

		if decode_timestamps.len() < count {
			return Err(Error::Demux(format!(
				"stts covers {} of {} samples",
				decode_timestamps.len(),
				count
			)));
		}

		let mut offsets = self.ctts.iter().flat_map(|&(run, offset)| std::iter::repeat_n(offset as i64, run as usize));

		let mut samples = Vec::with_capacity(count);
		let mut index = 0usize;

		for (chunk, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
			let per_chunk = self.samples_per_chunk(chunk as u32 + 1)?;

			let mut position = chunk_offset;
			for _ in 0..per_chunk {
				if index >= count {
					break;
				}

				let size = self.sizes[index] as u64;
				let start = usize::try_from(position).map_err(|_| Error::Demux("chunk offset overflow".into()))?;
				let end = start + size as usize;
				if end > file.len() {
					return Err(Error::Demux(format!("sample {} out of bounds: {}..{}", index, start, end)));
				}

				let keyframe = match &self.stss {
					Some(sync) => sync.binary_search(&(index as u32 + 1)).is_ok(),
					None => true,
				};

				samples.push(EncodedSample {
					decode_timestamp: decode_timestamps[index],
					composition_offset: offsets.next().unwrap_or(0),
					timescale: self.timescale,
					keyframe,
					payload: file.slice(start..end),
				});

				position += size;
				index += 1;
			}
		}

		if index < count {
			return Err(Error::Demux(format!("chunks cover {} of {} samples", index, count)));
		}

		Ok(samples)
	}

	// The last stsc run starting at or before `chunk`.
	fn samples_per_chunk(&self, chunk: u32) -> Result<u32> {
		self.stsc
			.iter()
			.take_while(|(first, _)| *first <= chunk)
			.last()
			.map(|(_, per_chunk)| *per_chunk)
			.ok_or_else(|| Error::Demux(format!("no stsc entry for chunk {}", chunk)))
	}
}
