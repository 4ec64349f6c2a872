//! Cuts planned segments out of the source with the `ffmpeg` command line tool.
//!
//! Streams are copied, never re-encoded, so cuts snap to the nearest keyframe.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::{Error, Result, Segment};

#[derive(Clone, Debug)]
pub struct Cutter {
	program: PathBuf,
	output: PathBuf,
}

impl Cutter {
	/// Write segments into the `output` directory.
	pub fn new(output: impl Into<PathBuf>) -> Self {
		Self {
			program: "ffmpeg".into(),
			output: output.into(),
		}
	}

	pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
		self.program = program.into();
		self
	}

	/// Where the segment will be written; the extension follows the input.
	pub fn output_path(&self, input: &Path, segment: &Segment) -> PathBuf {
		let ext = input.extension().and_then(|ext| ext.to_str()).unwrap_or("mp4");
		self.output.join(segment.file_name(ext))
	}

	pub fn command(&self, input: &Path, segment: &Segment) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.arg("-y").arg("-i").arg(input);
		cmd.arg("-ss").arg(format!("{:.3}", segment.start));

		if let Some(duration) = segment.length.bounded() {
			cmd.arg("-t").arg(format!("{:.3}", duration));
		}

		cmd.arg("-c").arg("copy");
		cmd.arg(self.output_path(input, segment));

		cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
		cmd.kill_on_drop(true);
		cmd
	}

	/// Cut a single segment, returning the written path.
	pub async fn cut(&self, input: &Path, segment: &Segment) -> Result<PathBuf> {
		let path = self.output_path(input, segment);
		tracing::info!(index = segment.index, label = %segment.label, path = %path.display(), "cutting segment");

		let output = self
			.command(input, segment)
			.output()
			.await
			.map_err(|err| Error::Transcode {
				index: segment.index,
				reason: format!("failed to spawn {}: {}", self.program.display(), err),
			})?;

		if !output.status.success() {
			return Err(Error::Transcode {
				index: segment.index,
				reason: format!(
					"exited with {}: {}",
					output.status,
					String::from_utf8_lossy(&output.stderr).trim()
				),
			});
		}

		Ok(path)
	}

	/// Cut every segment in order, stopping at the first failure.
	pub async fn cut_all(&self, input: &Path, segments: &[Segment]) -> Result<Vec<PathBuf>> {
		tokio::fs::create_dir_all(&self.output).await?;

		let mut paths = Vec::with_capacity(segments.len());
		for segment in segments {
			paths.push(self.cut(input, segment).await?);
		}

		Ok(paths)
	}
}
