use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use image::ImageFormat;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{RecognitionError, Recognizer};
use crate::Bitmap;

/// Recognizes text with the `tesseract` command line tool.
///
/// The bitmap is piped in as PNG and the text read back from stdout.
#[derive(Clone, Debug)]
pub struct Tesseract {
	program: PathBuf,
	language: String,
	timeout: Duration,
}

impl Default for Tesseract {
	fn default() -> Self {
		Self::new("tesseract")
	}
}

impl Tesseract {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			language: "eng".to_string(),
			timeout: Duration::from_secs(10),
		}
	}

	pub fn with_language(mut self, language: impl Into<String>) -> Self {
		self.language = language.into();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	fn program_name(&self) -> String {
		self.program
			.file_name()
			.unwrap_or(self.program.as_os_str())
			.to_string_lossy()
			.to_string()
	}

	fn command(&self) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.args(["stdin", "stdout", "-l", self.language.as_str()])
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		cmd
	}

	async fn run(&self, png: Vec<u8>) -> Result<String, RecognitionError> {
		let program = self.program_name();

		let mut child = self.command().spawn().map_err(|source| RecognitionError::Spawn {
			program: program.clone(),
			source,
		})?;

		if let Some(mut stdin) = child.stdin.take() {
			stdin.write_all(&png).await?;
			// Dropped to close the pipe.
		}

		let output = child.wait_with_output().await?;
		if !output.status.success() {
			return Err(RecognitionError::Failed {
				program,
				status: output.status.to_string(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).to_string())
	}
}

impl Recognizer for Tesseract {
	async fn recognize(&self, bitmap: Bitmap) -> Result<String, RecognitionError> {
		let mut png = Vec::new();
		bitmap.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

		match tokio::time::timeout(self.timeout, self.run(png)).await {
			Ok(res) => res,
			Err(_) => Err(RecognitionError::Timeout {
				program: self.program_name(),
			}),
		}
	}
}
