mod config;
mod log;

use config::*;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use levelcut::cut::Cutter;
use levelcut::source::{Mp4Source, SampleSource};
use levelcut::{Length, Outcome};
use std::path::{Path, PathBuf};

#[derive(Parser, Clone)]
#[command(version, about)]
pub struct Cli {
	#[command(flatten)]
	log: log::Log,

	/// Load settings from a TOML file.
	///
	/// Flags and environment variables take precedence over the file.
	#[arg(long, env = "LEVELCUT_CONFIG")]
	config: Option<PathBuf>,

	#[command(flatten)]
	settings: Config,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Print the video track of a file without decoding it.
	Probe {
		/// The MP4 file to inspect.
		input: PathBuf,
	},
	/// Play the file back, recognize level markers, and print the planned segments.
	Plan {
		/// The MP4 file to analyze.
		input: PathBuf,

		/// Print the markers and segments as JSON.
		#[arg(long)]
		json: bool,
	},
	/// Like `plan`, then cut each segment into its own file.
	Split {
		/// The MP4 file to analyze and cut.
		input: PathBuf,

		/// The directory to write segments into.
		#[arg(long, default_value = "segments")]
		out: PathBuf,

		/// The ffmpeg binary.
		#[arg(long, env = "LEVELCUT_FFMPEG", default_value = "ffmpeg")]
		ffmpeg: PathBuf,

		/// Print the markers, segments and written files as JSON.
		#[arg(long)]
		json: bool,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	cli.log.init();

	let config = match &cli.config {
		Some(path) => Config::load(path)?.merge(cli.settings.clone()),
		None => cli.settings.clone(),
	};

	match cli.command {
		Command::Probe { input } => probe(&input).await,
		Command::Plan { input, json } => {
			let outcome = analyze(&config, &input).await?;
			print(&outcome, json)
		}
		Command::Split {
			input,
			out,
			ffmpeg,
			json,
		} => {
			let outcome = analyze(&config, &input).await?;

			let cutter = Cutter::new(out).with_program(ffmpeg);
			let paths = cutter.cut_all(&input, &outcome.segments).await?;

			if json {
				let output = serde_json::json!({
					"durationMs": outcome.duration_ms,
					"events": outcome.events,
					"segments": outcome.segments,
					"files": paths,
				});
				println!("{}", serde_json::to_string_pretty(&output)?);
			} else {
				for path in paths {
					println!("{}", path.display());
				}
			}

			Ok(())
		}
	}
}

async fn read(input: &Path) -> anyhow::Result<Bytes> {
	let data = tokio::fs::read(input)
		.await
		.with_context(|| format!("failed to read {}", input.display()))?;
	Ok(data.into())
}

async fn probe(input: &Path) -> anyhow::Result<()> {
	let demuxed = Mp4Source.demux(read(input).await?)?;
	let keyframes = demuxed.samples.iter().filter(|sample| sample.keyframe).count();

	println!("codec:     {}", demuxed.codec.codec);
	println!("duration:  {:.3}s", demuxed.duration_ms / 1000.0);
	println!("samples:   {}", demuxed.samples.len());
	println!("keyframes: {}", keyframes);

	Ok(())
}

#[cfg(feature = "ffmpeg")]
async fn analyze(config: &Config, input: &Path) -> anyhow::Result<Outcome> {
	use levelcut::Pipeline;
	use levelcut::decode::FfmpegDecoder;

	let pipeline = Pipeline::new(config.pipeline()?, Mp4Source, config.tesseract());
	let input = read(input).await?;

	tokio::select! {
		res = pipeline.run(input, FfmpegDecoder::new(), config.canvas()) => Ok(res?),
		_ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
	}
}

#[cfg(not(feature = "ffmpeg"))]
async fn analyze(config: &Config, _input: &Path) -> anyhow::Result<Outcome> {
	// Still validate the settings, so a bad config is reported first.
	let _ = (config.pipeline()?, config.canvas(), config.tesseract());
	anyhow::bail!("decoding requires the `ffmpeg` feature; rebuild with `--features ffmpeg`")
}

fn print(outcome: &Outcome, json: bool) -> anyhow::Result<()> {
	if json {
		println!("{}", serde_json::to_string_pretty(outcome)?);
		return Ok(());
	}

	if outcome.segments.is_empty() {
		tracing::warn!("no markers recognized");
		return Ok(());
	}

	for segment in &outcome.segments {
		let length = match segment.length {
			Length::Bounded(seconds) => format!("{:.3}s", seconds),
			Length::ToEnd(seconds) => format!("{:.3}s (to end)", seconds),
		};

		println!("{}\t{}\t{:.3}s\t{}", segment.index, segment.label, segment.start, length);
	}

	Ok(())
}
