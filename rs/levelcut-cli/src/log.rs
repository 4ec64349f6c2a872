use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Logging configuration.
#[derive(clap::Args, Clone, Debug)]
pub struct Log {
	/// The minimum level to log. `RUST_LOG` directives take precedence.
	#[arg(id = "log-level", long = "log-level", env = "LEVELCUT_LOG_LEVEL", default_value = "info")]
	pub level: Level,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: Level::INFO }
	}
}

impl Log {
	/// Install the global subscriber, writing to stderr so stdout stays machine readable.
	pub fn init(&self) {
		let filter = EnvFilter::builder()
			.with_default_directive(LevelFilter::from_level(self.level).into())
			.from_env_lossy();

		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.init();
	}
}
