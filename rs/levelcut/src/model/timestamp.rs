use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timestamp overflow")]
pub struct TimestampOverflow;

/// The presentation time of a decoded frame in microseconds.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
	/// The zero timestamp.
	pub const ZERO: Self = Self(0);

	pub const fn from_secs(seconds: u64) -> Result<Self, TimestampOverflow> {
		match seconds.checked_mul(1_000_000) {
			Some(micros) => Ok(Self(micros)),
			None => Err(TimestampOverflow),
		}
	}

	pub const fn from_millis(millis: u64) -> Result<Self, TimestampOverflow> {
		match millis.checked_mul(1000) {
			Some(micros) => Ok(Self(micros)),
			None => Err(TimestampOverflow),
		}
	}

	pub const fn from_micros(micros: u64) -> Self {
		Self(micros)
	}

	/// Convert a value expressed in `timescale` units per second.
	///
	/// A zero timescale is treated as microseconds.
	pub const fn from_scale(value: u64, timescale: u64) -> Result<Self, TimestampOverflow> {
		if timescale == 0 || timescale == 1_000_000 {
			return Ok(Self(value));
		}

		// Split to avoid overflowing the intermediate product.
		let whole = value / timescale;
		let rem = value % timescale;

		let Some(whole) = whole.checked_mul(1_000_000) else {
			return Err(TimestampOverflow);
		};

		let rem = (rem as u128 * 1_000_000 / timescale as u128) as u64;
		match whole.checked_add(rem) {
			Some(micros) => Ok(Self(micros)),
			None => Err(TimestampOverflow),
		}
	}

	/// Get the timestamp as microseconds.
	pub const fn as_micros(self) -> u64 {
		self.0
	}

	/// Get the timestamp as milliseconds.
	pub const fn as_millis(self) -> u64 {
		self.0 / 1000
	}

	/// Get the timestamp as fractional milliseconds.
	pub fn as_millis_f64(self) -> f64 {
		self.0 as f64 / 1000.0
	}

	pub fn checked_add(self, rhs: Self) -> Option<Self> {
		self.0.checked_add(rhs.0).map(Self)
	}

	pub fn checked_sub(self, rhs: Self) -> Option<Self> {
		self.0.checked_sub(rhs.0).map(Self)
	}

	pub fn saturating_sub(self, rhs: Self) -> Self {
		Self(self.0.saturating_sub(rhs.0))
	}
}

impl TryFrom<Duration> for Timestamp {
	type Error = TimestampOverflow;

	fn try_from(duration: Duration) -> Result<Self, Self::Error> {
		duration
			.as_micros()
			.try_into()
			.map(Self)
			.map_err(|_| TimestampOverflow)
	}
}

impl From<Timestamp> for Duration {
	fn from(timestamp: Timestamp) -> Self {
		Duration::from_micros(timestamp.0)
	}
}

impl std::fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}
