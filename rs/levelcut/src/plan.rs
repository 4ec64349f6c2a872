//! Converts marker change events into contiguous segments for the cutter.

use serde::{Deserialize, Serialize};

use crate::marker::MarkerChangeEvent;

/// The label used when a video without markers is kept whole.
pub const WHOLE_LABEL: &str = "full";

/// How long a segment runs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "seconds")]
pub enum Length {
	/// Ends where the next segment starts.
	Bounded(f64),

	/// Runs until the end of the video; the value is the remaining duration.
	ToEnd(f64),
}

impl Length {
	pub fn seconds(&self) -> f64 {
		match *self {
			Self::Bounded(seconds) | Self::ToEnd(seconds) => seconds,
		}
	}

	/// The duration to pass to the cutter, or [None] to cut until the end.
	pub fn bounded(&self) -> Option<f64> {
		match *self {
			Self::Bounded(seconds) => Some(seconds),
			Self::ToEnd(_) => None,
		}
	}
}

/// A contiguous time range associated with one marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
	pub index: usize,
	pub label: String,
	pub start: f64,
	pub length: Length,
}

impl Segment {
	pub fn end(&self) -> f64 {
		self.start + self.length.seconds()
	}

	/// The deterministic output name, `{index}_{label}.{ext}`.
	pub fn file_name(&self, ext: &str) -> String {
		format!("{}_{}.{}", self.index, self.label, ext)
	}
}

/// What to produce when no marker was ever recognized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoMarkers {
	/// Produce no segments.
	#[default]
	Skip,

	/// Produce one segment spanning the whole video.
	Whole,
}

impl std::str::FromStr for NoMarkers {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"skip" => Ok(Self::Skip),
			"whole" => Ok(Self::Whole),
			_ => Err(format!("expected 'skip' or 'whole', got '{s}'")),
		}
	}
}

/// Plan one segment per change event.
///
/// Each segment runs until the next event starts; the last runs to the end of the video.
pub fn plan(events: &[MarkerChangeEvent], total_ms: f64) -> Vec<Segment> {
	let total = total_ms / 1000.0;

	let mut segments = Vec::with_capacity(events.len());
	for (index, event) in events.iter().enumerate() {
		let start = event.relative_time_ms / 1000.0;
		let length = match events.get(index + 1) {
			Some(next) => Length::Bounded(next.relative_time_ms / 1000.0 - start),
			None => Length::ToEnd((total - start).max(0.0)),
		};

		segments.push(Segment {
			index,
			label: event.marker.to_string(),
			start,
			length,
		});
	}

	segments
}

/// Like [plan], applying `policy` when there are no events.
pub fn plan_with(events: &[MarkerChangeEvent], total_ms: f64, policy: NoMarkers) -> Vec<Segment> {
	if !events.is_empty() || policy == NoMarkers::Skip {
		return plan(events, total_ms);
	}

	vec![Segment {
		index: 0,
		label: WHOLE_LABEL.to_string(),
		start: 0.0,
		length: Length::ToEnd((total_ms / 1000.0).max(0.0)),
	}]
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::marker::Marker;

	fn event(ms: f64, text: &str) -> MarkerChangeEvent {
		MarkerChangeEvent {
			relative_time_ms: ms,
			marker: Marker::parse(text).unwrap(),
		}
	}

	#[test]
	fn two_levels() {
		let events = [event(0.0, "WORLD 1-1"), event(5000.0, "WORLD 1-2")];
		let segments = plan(&events, 8000.0);

		assert_eq!(
			segments,
			[
				Segment {
					index: 0,
					label: "1-1".into(),
					start: 0.0,
					length: Length::Bounded(5.0),
				},
				Segment {
					index: 1,
					label: "1-2".into(),
					start: 5.0,
					length: Length::ToEnd(3.0),
				},
			]
		);
	}

	#[test]
	fn empty() {
		assert!(plan(&[], 8000.0).is_empty());
		assert!(plan_with(&[], 8000.0, NoMarkers::Skip).is_empty());
	}

	#[test]
	fn whole() {
		let segments = plan_with(&[], 8000.0, NoMarkers::Whole);
		assert_eq!(segments.len(), 1);
		assert_eq!(segments[0].file_name("mp4"), "0_full.mp4");
		assert_eq!(segments[0].length, Length::ToEnd(8.0));

		// The policy only applies without events.
		let events = [event(1000.0, "WORLD 3-1")];
		assert_eq!(plan_with(&events, 8000.0, NoMarkers::Whole)[0].label, "3-1");
	}

	#[test]
	fn contiguous() {
		let events = [
			event(1200.0, "WORLD 1-1"),
			event(43_517.5, "WORLD 1-2"),
			event(97_003.25, "WORLD 1-3"),
			event(150_000.0, "WORLD 1-4"),
		];
		let total = 181_333.0;
		let segments = plan(&events, total);

		assert_eq!(segments.len(), events.len());
		for (i, pair) in segments.windows(2).enumerate() {
			assert_eq!(pair[0].index, i);
			assert!((pair[0].end() - pair[1].start).abs() < 1e-9);
			assert!(pair[0].length.bounded().is_some());
		}

		let last = segments.last().unwrap();
		assert!(last.length.bounded().is_none());

		let sum: f64 = segments.iter().map(|s| s.length.seconds()).sum();
		assert!((segments[0].start + sum - total / 1000.0).abs() < 0.001);
	}

	#[test]
	fn past_the_end() {
		let events = [event(0.0, "WORLD 1-1"), event(9000.0, "WORLD 1-2")];
		let segments = plan(&events, 8000.0);
		assert_eq!(segments[1].length, Length::ToEnd(0.0));
	}

	#[test]
	fn file_names() {
		let events = [event(0.0, "WORLD 1-1"), event(5000.0, "WORLD 1-2")];
		let names: Vec<_> = plan(&events, 8000.0).iter().map(|s| s.file_name("mp4")).collect();
		assert_eq!(names, ["0_1-1.mp4", "1_1-2.mp4"]);
	}

	#[test]
	fn serialize() {
		let segments = plan(&[event(0.0, "WORLD 1-1")], 2500.0);
		let json = serde_json::to_value(&segments).unwrap();
		assert_eq!(
			json,
			serde_json::json!([{
				"index": 0,
				"label": "1-1",
				"start": 0.0,
				"length": { "kind": "toEnd", "seconds": 2.5 }
			}])
		);
	}
}
