use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use levelcut::recognize::Tesseract;
use levelcut::render::{CANVAS_HEIGHT, CANVAS_WIDTH, Canvas};
use levelcut::{NoMarkers, PipelineConfig};

/// Settings shared by every command.
///
/// Each field may come from a TOML file, the environment, or a flag.
/// Unset fields fall back to the library defaults.
#[derive(Clone, Debug, Default, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
	/// How often the rendered output is captured for recognition.
	#[arg(
		id = "sample-period",
		long = "sample-period",
		env = "LEVELCUT_SAMPLE_PERIOD",
		value_parser = humantime::parse_duration,
	)]
	#[serde(with = "humantime_serde")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sample_period: Option<Duration>,

	/// How often due frames are presented.
	#[arg(
		id = "tick-interval",
		long = "tick-interval",
		env = "LEVELCUT_TICK_INTERVAL",
		value_parser = humantime::parse_duration,
	)]
	#[serde(with = "humantime_serde")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tick_interval: Option<Duration>,

	/// Play back faster (or slower) than real time.
	///
	/// Recognition has less time per frame, so markers shown briefly may be missed.
	#[arg(id = "time-scale", long = "time-scale", env = "LEVELCUT_TIME_SCALE")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub time_scale: Option<f64>,

	/// Decoded frames buffered ahead of presentation.
	#[arg(id = "max-queued", long = "max-queued", env = "LEVELCUT_MAX_QUEUED")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_queued: Option<usize>,

	/// Consecutive sightings needed before a new marker is accepted.
	#[arg(id = "confirmations", long = "confirmations", env = "LEVELCUT_CONFIRMATIONS")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmations: Option<u32>,

	/// Binarize and blur captures before recognition.
	#[arg(
		id = "legibility",
		long = "legibility",
		env = "LEVELCUT_LEGIBILITY",
		default_missing_value = "true",
		num_args = 0..=1,
		value_parser = clap::value_parser!(bool),
	)]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub legibility: Option<bool>,

	/// What to plan when no marker is ever recognized: `skip` or `whole`.
	#[arg(id = "no-markers", long = "no-markers", env = "LEVELCUT_NO_MARKERS")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub no_markers: Option<NoMarkers>,

	/// The width of the canvas frames are scaled onto before recognition.
	#[arg(id = "canvas-width", long = "canvas-width", env = "LEVELCUT_CANVAS_WIDTH")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub canvas_width: Option<u32>,

	/// The height of the canvas frames are scaled onto before recognition.
	#[arg(id = "canvas-height", long = "canvas-height", env = "LEVELCUT_CANVAS_HEIGHT")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub canvas_height: Option<u32>,

	/// The tesseract binary.
	#[arg(id = "tesseract", long = "tesseract", env = "LEVELCUT_TESSERACT")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tesseract: Option<PathBuf>,

	/// The tesseract language.
	#[arg(id = "language", long = "language", env = "LEVELCUT_LANGUAGE")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,

	/// Give up on a single recognition after this long.
	#[arg(
		id = "recognize-timeout",
		long = "recognize-timeout",
		env = "LEVELCUT_RECOGNIZE_TIMEOUT",
		value_parser = humantime::parse_duration,
	)]
	#[serde(with = "humantime_serde")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub recognize_timeout: Option<Duration>,
}

impl Config {
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let contents =
			std::fs::read_to_string(path).with_context(|| format!("failed to read config: {}", path.display()))?;
		toml::from_str(&contents).with_context(|| format!("failed to parse config: {}", path.display()))
	}

	/// Fill in anything unset in `overrides` from `self`.
	pub fn merge(self, overrides: Self) -> Self {
		Self {
			sample_period: overrides.sample_period.or(self.sample_period),
			tick_interval: overrides.tick_interval.or(self.tick_interval),
			time_scale: overrides.time_scale.or(self.time_scale),
			max_queued: overrides.max_queued.or(self.max_queued),
			confirmations: overrides.confirmations.or(self.confirmations),
			legibility: overrides.legibility.or(self.legibility),
			no_markers: overrides.no_markers.or(self.no_markers),
			canvas_width: overrides.canvas_width.or(self.canvas_width),
			canvas_height: overrides.canvas_height.or(self.canvas_height),
			tesseract: overrides.tesseract.or(self.tesseract),
			language: overrides.language.or(self.language),
			recognize_timeout: overrides.recognize_timeout.or(self.recognize_timeout),
		}
	}

	pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
		let mut config = PipelineConfig::default();

		if let Some(period) = self.sample_period {
			config.sample_period = period;
		}
		if let Some(interval) = self.tick_interval {
			config.tick_interval = interval;
		}
		if let Some(scale) = self.time_scale {
			anyhow::ensure!(scale.is_finite() && scale > 0.0, "time scale must be positive: {scale}");
			config.time_scale = scale;
		}
		if let Some(max) = self.max_queued {
			config.max_queued = max;
		}
		if let Some(confirmations) = self.confirmations {
			config.confirmations = confirmations;
		}
		if let Some(legibility) = self.legibility {
			config.legibility = legibility;
		}
		if let Some(policy) = self.no_markers {
			config.no_markers = policy;
		}

		Ok(config)
	}

	pub fn canvas(&self) -> Canvas {
		Canvas::new(
			self.canvas_width.unwrap_or(CANVAS_WIDTH),
			self.canvas_height.unwrap_or(CANVAS_HEIGHT),
		)
	}

	pub fn tesseract(&self) -> Tesseract {
		let mut tesseract = match &self.tesseract {
			Some(program) => Tesseract::new(program),
			None => Tesseract::default(),
		};

		if let Some(language) = &self.language {
			tesseract = tesseract.with_language(language);
		}
		if let Some(timeout) = self.recognize_timeout {
			tesseract = tesseract.with_timeout(timeout);
		}

		tesseract
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[derive(Parser)]
	struct Test {
		#[command(flatten)]
		config: Config,
	}

	#[test]
	fn test_toml() {
		let toml = r#"
			sample_period = "250ms"
			time_scale = 2.0
			no_markers = "whole"
			language = "deu"
		"#;

		let config: Config = toml::from_str(toml).unwrap();
		assert_eq!(config.sample_period, Some(Duration::from_millis(250)));
		assert_eq!(config.no_markers, Some(NoMarkers::Whole));

		let pipeline = config.pipeline().unwrap();
		assert_eq!(pipeline.sample_period, Duration::from_millis(250));
		assert_eq!(pipeline.time_scale, 2.0);
		assert_eq!(pipeline.max_queued, PipelineConfig::default().max_queued);
	}

	#[test]
	fn test_toml_unknown_field() {
		assert!(toml::from_str::<Config>("sample_rate = \"1s\"").is_err());
	}

	#[test]
	fn test_flags_override_file() {
		let file: Config = toml::from_str(
			r#"
			sample_period = "250ms"
			time_scale = 2.0
		"#,
		)
		.unwrap();

		let flags = Test::parse_from(["test", "--time-scale", "4", "--legibility"]).config;
		let config = file.merge(flags);

		assert_eq!(config.sample_period, Some(Duration::from_millis(250)));
		assert_eq!(config.time_scale, Some(4.0));
		assert_eq!(config.legibility, Some(true));
	}

	#[test]
	fn test_cli_no_flags() {
		let config = Test::parse_from(["test"]).config;
		assert_eq!(config.legibility, None);

		let pipeline = config.pipeline().unwrap();
		assert_eq!(pipeline.sample_period, levelcut::sampler::SAMPLE_PERIOD);
		assert!(pipeline.legibility);

		let canvas = config.canvas();
		assert_eq!((canvas.width(), canvas.height()), (CANVAS_WIDTH, CANVAS_HEIGHT));
	}

	#[test]
	fn test_cli_legibility_explicit_false() {
		let config = Test::parse_from(["test", "--legibility", "false"]).config;
		assert_eq!(config.legibility, Some(false));
		assert!(!config.pipeline().unwrap().legibility);
	}

	#[test]
	fn test_bad_time_scale() {
		let config = Test::parse_from(["test", "--time-scale", "0"]).config;
		assert!(config.pipeline().is_err());
	}

	#[test]
	fn test_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("levelcut.toml");
		std::fs::write(&path, "confirmations = 3\nrecognize_timeout = \"2s\"\n").unwrap();

		let config = Config::load(&path).unwrap();
		assert_eq!(config.confirmations, Some(3));
		assert_eq!(config.recognize_timeout, Some(Duration::from_secs(2)));

		assert!(Config::load(&dir.path().join("missing.toml")).is_err());
	}
}
