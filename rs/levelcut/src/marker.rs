//! Turns noisy recognition output into a clean list of level changes.
//!
//! Recognized text is matched against `WORLD <major>-<minor>` (case-insensitive, optional whitespace).
//! The first sighting of a new marker is authoritative; repeated sightings of the current marker are no-ops.
//! Optionally, [Debounce::with_confirmations] requires a run of matching samples before accepting a change.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::PresentationClock;
use crate::recognize::RecognitionSample;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
	// Never fails; the pattern is a literal.
	Regex::new(r"(?i)WORLD\s*(\d+)-(\d+)").unwrap()
});

/// A level identifier, ex. `1-2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(transparent)]
pub struct Marker(String);

impl Marker {
	/// Extract the first marker from recognized text, if any.
	pub fn parse(text: &str) -> Option<Self> {
		let captures = MARKER.captures(text)?;
		Some(Self(format!("{}-{}", &captures[1], &captures[2])))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

/// The point in media time where a new marker was first seen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerChangeEvent {
	/// Milliseconds since the presentation clock started.
	pub relative_time_ms: f64,

	pub marker: Marker,
}

/// Collapses recognition samples into an append-only list of marker changes.
#[derive(Debug)]
pub struct Debounce {
	confirmations: u32,

	last: Option<Marker>,

	// The marker being confirmed, when it was first seen, and how many times.
	candidate: Option<(Marker, f64, u32)>,

	events: Vec<MarkerChangeEvent>,
}

impl Default for Debounce {
	fn default() -> Self {
		Self::new()
	}
}

impl Debounce {
	/// Accept a new marker on its first sighting.
	pub fn new() -> Self {
		Self::with_confirmations(1)
	}

	/// Accept a new marker only after `confirmations` consecutive sightings.
	///
	/// Samples without a marker don't break a run; a different marker restarts it.
	pub fn with_confirmations(confirmations: u32) -> Self {
		Self {
			confirmations: confirmations.max(1),
			last: None,
			candidate: None,
			events: Vec::new(),
		}
	}

	/// Feed one recognition sample, returning the change event if one was accepted.
	///
	/// Samples are ignored when the clock hasn't started or when they don't land after the previous event.
	pub fn observe(&mut self, sample: &RecognitionSample, clock: Option<PresentationClock>) -> Option<&MarkerChangeEvent> {
		let marker = Marker::parse(&sample.text)?;

		let Some(relative) = clock.and_then(|clock| clock.relative_ms(sample.captured_at)) else {
			tracing::debug!(%marker, "ignoring marker captured before presentation started");
			return None;
		};

		if self.events.last().is_some_and(|last| relative <= last.relative_time_ms) {
			tracing::debug!(%marker, relative, "ignoring out of order marker");
			return None;
		}

		if self.last.as_ref() == Some(&marker) {
			self.candidate = None;
			return None;
		}

		let (first_seen, count) = match self.candidate.take() {
			Some((candidate, first_seen, count)) if candidate == marker => (first_seen, count + 1),
			_ => (relative, 1),
		};

		if count < self.confirmations {
			tracing::trace!(%marker, count, "confirming marker");
			self.candidate = Some((marker, first_seen, count));
			return None;
		}

		tracing::info!(%marker, relative_ms = first_seen, "marker changed");

		self.last = Some(marker.clone());
		self.events.push(MarkerChangeEvent {
			relative_time_ms: first_seen,
			marker,
		});

		self.events.last()
	}

	/// The most recently accepted marker.
	pub fn current(&self) -> Option<&Marker> {
		self.last.as_ref()
	}

	pub fn events(&self) -> &[MarkerChangeEvent] {
		&self.events
	}

	pub fn into_events(self) -> Vec<MarkerChangeEvent> {
		self.events
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use std::time::Duration;
	use tokio::time::Instant;

	fn sample(clock: &PresentationClock, ms: u64, text: &str) -> RecognitionSample {
		RecognitionSample {
			captured_at: clock.start + Duration::from_millis(ms),
			text: text.to_string(),
		}
	}

	fn markers(debounce: &Debounce) -> Vec<&str> {
		debounce.events().iter().map(|e| e.marker.as_str()).collect()
	}

	#[test]
	fn parse() {
		assert_eq!(Marker::parse("WORLD 1-1").unwrap().as_str(), "1-1");
		assert_eq!(Marker::parse("WORLD 2-3").unwrap().to_string(), "2-3");
		assert_eq!(Marker::parse("world4-12 TIME 300").unwrap().as_str(), "4-12");
		assert_eq!(Marker::parse("MARIO  WORLD \n 8-4").unwrap().as_str(), "8-4");
		assert!(Marker::parse("WORLD").is_none());
		assert!(Marker::parse("WORLD 1 - 1").is_none());
		assert!(Marker::parse("").is_none());
	}

	#[test]
	fn first_sighting_wins() {
		let clock = PresentationClock::new(Instant::now(), 1.0);
		let mut debounce = Debounce::new();

		let texts = ["", "WORLD 1-1", "WORLD 1-1", "garbage", "WORLD 1-2"];
		for (i, text) in texts.iter().enumerate() {
			debounce.observe(&sample(&clock, 500 * i as u64, text), Some(clock));
		}

		assert_eq!(markers(&debounce), ["1-1", "1-2"]);
		assert_eq!(debounce.events()[0].relative_time_ms, 500.0);
		assert_eq!(debounce.events()[1].relative_time_ms, 2000.0);
		assert_eq!(debounce.current().unwrap().as_str(), "1-2");
	}

	#[test]
	fn no_consecutive_duplicates() {
		let clock = PresentationClock::new(Instant::now(), 1.0);
		let mut debounce = Debounce::new();

		let texts = ["WORLD 1-1", "WORLD 1-2", "WORLD 1-2", "WORLD 1-1", "WORLD 1-1"];
		for (i, text) in texts.iter().enumerate() {
			debounce.observe(&sample(&clock, 100 * (i as u64 + 1), text), Some(clock));
		}

		assert_eq!(markers(&debounce), ["1-1", "1-2", "1-1"]);
		for pair in debounce.events().windows(2) {
			assert_ne!(pair[0].marker, pair[1].marker);
			assert!(pair[0].relative_time_ms < pair[1].relative_time_ms);
		}
	}

	#[test]
	fn never_matches() {
		let clock = PresentationClock::new(Instant::now(), 1.0);
		let mut debounce = Debounce::new();

		for i in 0..10 {
			assert!(debounce.observe(&sample(&clock, i * 500, "TIME 400"), Some(clock)).is_none());
		}

		assert!(debounce.events().is_empty());
		assert!(debounce.current().is_none());
	}

	#[test]
	fn clock_not_started() {
		let mut debounce = Debounce::new();
		let sample = RecognitionSample {
			captured_at: Instant::now(),
			text: "WORLD 1-1".to_string(),
		};

		assert!(debounce.observe(&sample, None).is_none());
		assert!(debounce.events().is_empty());
	}

	#[test]
	fn media_time() {
		let clock = PresentationClock::new(Instant::now(), 4.0);
		let mut debounce = Debounce::new();

		let event = debounce.observe(&sample(&clock, 250, "WORLD 2-1"), Some(clock)).unwrap();
		assert_eq!(event.relative_time_ms, 1000.0);
	}

	#[test]
	fn confirmations() {
		let clock = PresentationClock::new(Instant::now(), 1.0);
		let mut debounce = Debounce::with_confirmations(2);

		let texts = [
			"WORLD 1-1", // candidate
			"",          // doesn't break the run
			"WORLD 1-1", // accepted at 0ms
			"WORLD 7-7", // misread, restarted by the next sample
			"WORLD 1-2", // candidate
			"WORLD 1-2", // accepted at 2000ms
		];

		for (i, text) in texts.iter().enumerate() {
			debounce.observe(&sample(&clock, 500 * i as u64, text), Some(clock));
		}

		assert_eq!(markers(&debounce), ["1-1", "1-2"]);
		assert_eq!(debounce.events()[0].relative_time_ms, 0.0);
		assert_eq!(debounce.events()[1].relative_time_ms, 2000.0);
	}

	#[test]
	fn serialize() {
		let event = MarkerChangeEvent {
			relative_time_ms: 5000.0,
			marker: Marker::parse("WORLD 1-2").unwrap(),
		};

		let json = serde_json::to_string(&event).unwrap();
		assert_eq!(json, r#"{"relativeTimeMs":5000.0,"marker":"1-2"}"#);
	}
}
