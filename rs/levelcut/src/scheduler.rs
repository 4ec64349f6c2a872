//! Presents decoded frames against the wall clock.
//!
//! The first enqueued frame pins the presentation clock: its timestamp maps to the wall-clock instant it arrived.
//! Every later frame is due once the scaled wall-clock time since then reaches its timestamp offset.
//! Frames are never reordered; a late frame is simply rendered on the next tick.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::{RenderTarget, Timestamp, VideoFrame};

/// The mapping from wall-clock instants to media time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PresentationClock {
	/// The wall-clock instant the first frame was enqueued.
	pub start: Instant,

	/// Media time elapsed per unit of wall-clock time.
	pub time_scale: f64,
}

impl PresentationClock {
	pub fn new(start: Instant, time_scale: f64) -> Self {
		Self { start, time_scale }
	}

	/// Media time elapsed at `now`, or [None] if `now` is before the clock started.
	pub fn elapsed(&self, now: Instant) -> Option<Duration> {
		let wall = now.checked_duration_since(self.start)?;
		if self.time_scale == 1.0 {
			return Some(wall);
		}

		Some(wall.mul_f64(self.time_scale))
	}

	/// Milliseconds of media time elapsed at `now`.
	pub fn relative_ms(&self, now: Instant) -> Option<f64> {
		let wall = now.checked_duration_since(self.start)?;
		Some(wall.as_secs_f64() * 1000.0 * self.time_scale)
	}
}

/// Counters for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
	/// Frames successfully drawn to the render target.
	pub rendered: u64,

	/// Frames released, rendered or not.
	pub released: u64,

	/// Frames ever enqueued.
	pub queued: u64,
}

/// A time-ordered queue of decoded frames, drained by [Scheduler::tick].
pub struct Scheduler<T: RenderTarget> {
	target: T,
	queue: VecDeque<VideoFrame>,

	// Both set once by the first enqueue after construction or reset.
	first_timestamp: Option<Timestamp>,
	start: Option<Instant>,

	time_scale: f64,
	active: bool,
	stats: SchedulerStats,
}

impl<T: RenderTarget> Scheduler<T> {
	/// Present frames in real time.
	pub fn new(target: T) -> Self {
		Self::with_time_scale(target, 1.0)
	}

	/// Present frames `time_scale` times faster than real time.
	///
	/// Non-positive or non-finite values fall back to real time.
	pub fn with_time_scale(target: T, time_scale: f64) -> Self {
		let time_scale = if time_scale.is_finite() && time_scale > 0.0 {
			time_scale
		} else {
			1.0
		};

		Self {
			target,
			queue: VecDeque::new(),
			first_timestamp: None,
			start: None,
			time_scale,
			active: true,
			stats: SchedulerStats::default(),
		}
	}

	pub fn enqueue(&mut self, frame: VideoFrame) {
		self.enqueue_at(frame, Instant::now())
	}

	/// Append a frame, pinning the presentation clock to `now` if this is the first one.
	pub fn enqueue_at(&mut self, frame: VideoFrame, now: Instant) {
		if !self.active {
			tracing::debug!(timestamp = %frame.timestamp, "scheduler stopped, releasing frame");
			self.release(frame);
			return;
		}

		if self.start.is_none() {
			tracing::debug!(timestamp = %frame.timestamp, "presentation clock started");
			self.first_timestamp = Some(frame.timestamp);
			self.start = Some(now);
		}

		self.stats.queued += 1;
		self.queue.push_back(frame);
	}

	pub fn tick(&mut self) -> usize {
		self.tick_at(Instant::now())
	}

	/// Render and release every frame that is due at `now`, returning how many were rendered.
	pub fn tick_at(&mut self, now: Instant) -> usize {
		if !self.active {
			return 0;
		}

		let (Some(clock), Some(first)) = (self.clock(), self.first_timestamp) else {
			return 0;
		};

		let elapsed = clock.elapsed(now).unwrap_or_default();

		let mut count = 0;
		while let Some(head) = self.queue.front() {
			let offset: Duration = head.timestamp.saturating_sub(first).into();
			if offset > elapsed {
				break;
			}

			let Some(frame) = self.queue.pop_front() else { break };

			match self.target.render(&frame) {
				Ok(()) => {
					self.stats.rendered += 1;
					count += 1;
				}
				Err(err) => tracing::warn!(%err, timestamp = %frame.timestamp, "failed to render frame"),
			}

			self.release(frame);
		}

		count
	}

	/// Halt ticking and release every queued frame.
	pub fn stop(&mut self) {
		self.active = false;
		self.clear();
	}

	/// Forget the presentation clock and release every queued frame.
	///
	/// The next enqueue pins a new clock.
	pub fn reset(&mut self) {
		self.clear();
		self.first_timestamp = None;
		self.start = None;
		self.active = true;
	}

	/// The instant the presentation clock started, if it did.
	pub fn start_wall_clock(&self) -> Option<Instant> {
		self.start
	}

	pub fn first_timestamp(&self) -> Option<Timestamp> {
		self.first_timestamp
	}

	pub fn clock(&self) -> Option<PresentationClock> {
		self.start.map(|start| PresentationClock::new(start, self.time_scale))
	}

	pub fn time_scale(&self) -> f64 {
		self.time_scale
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn stats(&self) -> SchedulerStats {
		self.stats
	}

	pub fn target(&self) -> &T {
		&self.target
	}

	pub fn target_mut(&mut self) -> &mut T {
		&mut self.target
	}

	fn clear(&mut self) {
		if !self.queue.is_empty() {
			tracing::debug!(count = self.queue.len(), "releasing queued frames");
		}

		while let Some(frame) = self.queue.pop_front() {
			self.release(frame);
		}
	}

	fn release(&mut self, frame: VideoFrame) {
		self.stats.released += 1;
		frame.close();
	}
}

impl<T: RenderTarget> Drop for Scheduler<T> {
	fn drop(&mut self) {
		self.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::render::{Bitmap, RenderError};
	use crate::{Plane, VideoFormat};
	use std::sync::{Arc, Mutex};

	#[derive(Clone, Default)]
	struct Recorder {
		rendered: Arc<Mutex<Vec<u64>>>,
		fail: bool,
	}

	impl Recorder {
		fn rendered(&self) -> Vec<u64> {
			self.rendered.lock().unwrap().clone()
		}
	}

	impl RenderTarget for Recorder {
		fn render(&mut self, frame: &VideoFrame) -> crate::render::Result<()> {
			if self.fail {
				return Err(RenderError::RenderError("nope".into()));
			}

			self.rendered.lock().unwrap().push(frame.timestamp.as_millis());
			Ok(())
		}

		fn resize(&mut self, _width: u32, _height: u32) -> crate::render::Result<()> {
			Ok(())
		}

		fn capture(&self) -> Option<Bitmap> {
			None
		}
	}

	// Every frame shares `pixels`, so its strong count reveals leaked frames.
	fn frame(ms: u64, pixels: &Arc<Vec<u8>>) -> VideoFrame {
		VideoFrame {
			timestamp: Timestamp::from_millis(ms).unwrap(),
			format: VideoFormat::YUV420P,
			width: 1,
			height: 1,
			planes: vec![Plane {
				data: pixels.clone(),
				stride: 1,
			}],
		}
	}

	fn ms(ms: u64) -> Duration {
		Duration::from_millis(ms)
	}

	#[test]
	fn releases_due_frames() {
		let recorder = Recorder::default();
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(recorder.clone());

		let start = Instant::now();
		for ts in [1000, 1040, 1080, 1120] {
			scheduler.enqueue_at(frame(ts, &pixels), start);
		}

		assert_eq!(scheduler.start_wall_clock(), Some(start));
		assert_eq!(scheduler.first_timestamp(), Some(Timestamp::from_millis(1000).unwrap()));

		assert_eq!(scheduler.tick_at(start), 1);
		assert_eq!(scheduler.tick_at(start + ms(39)), 0);
		assert_eq!(scheduler.tick_at(start + ms(40)), 1);
		assert_eq!(scheduler.tick_at(start + ms(500)), 2);
		assert_eq!(scheduler.tick_at(start + ms(600)), 0);

		assert_eq!(recorder.rendered(), [1000, 1040, 1080, 1120]);
		assert_eq!(Arc::strong_count(&pixels), 1);
		assert_eq!(
			scheduler.stats(),
			SchedulerStats {
				rendered: 4,
				released: 4,
				queued: 4,
			}
		);
	}

	#[test]
	fn clock_set_once() {
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(Recorder::default());

		let start = Instant::now();
		scheduler.enqueue_at(frame(0, &pixels), start);
		scheduler.enqueue_at(frame(40, &pixels), start + ms(30));

		assert_eq!(scheduler.start_wall_clock(), Some(start));
		assert_eq!(scheduler.first_timestamp(), Some(Timestamp::ZERO));
	}

	#[test]
	fn late_frames_in_order() {
		let recorder = Recorder::default();
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(recorder.clone());

		let start = Instant::now();
		scheduler.enqueue_at(frame(0, &pixels), start);
		scheduler.enqueue_at(frame(40, &pixels), start + ms(200));
		scheduler.enqueue_at(frame(80, &pixels), start + ms(200));
		scheduler.enqueue_at(frame(1000, &pixels), start + ms(200));

		assert_eq!(scheduler.tick_at(start + ms(200)), 3);
		assert_eq!(recorder.rendered(), [0, 40, 80]);
		assert_eq!(scheduler.len(), 1);
	}

	#[test]
	fn nothing_before_first_enqueue() {
		let mut scheduler = Scheduler::new(Recorder::default());
		assert_eq!(scheduler.tick(), 0);
		assert!(scheduler.clock().is_none());
	}

	#[test]
	fn time_scale() {
		let recorder = Recorder::default();
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::with_time_scale(recorder.clone(), 4.0);

		let start = Instant::now();
		for ts in [0, 100, 200, 300, 400] {
			scheduler.enqueue_at(frame(ts, &pixels), start);
		}

		assert_eq!(scheduler.tick_at(start + ms(50)), 3);
		assert_eq!(scheduler.tick_at(start + ms(100)), 2);
		let relative = scheduler.clock().unwrap().relative_ms(start + ms(100)).unwrap();
		assert!((relative - 400.0).abs() < 1e-9);
	}

	#[test]
	fn stop_releases() {
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(Recorder::default());

		let start = Instant::now();
		for ts in 0..10 {
			scheduler.enqueue_at(frame(ts * 40, &pixels), start);
		}
		assert_eq!(Arc::strong_count(&pixels), 11);

		scheduler.stop();
		assert!(scheduler.is_empty());
		assert_eq!(Arc::strong_count(&pixels), 1);

		// Stopped schedulers neither render nor hold frames.
		scheduler.enqueue_at(frame(1000, &pixels), start);
		assert_eq!(scheduler.tick_at(start + ms(5000)), 0);
		assert_eq!(Arc::strong_count(&pixels), 1);
		assert_eq!(scheduler.stats().released, 11);
	}

	#[test]
	fn drop_releases() {
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(Recorder::default());

		let start = Instant::now();
		scheduler.enqueue_at(frame(0, &pixels), start);
		scheduler.enqueue_at(frame(40, &pixels), start);
		drop(scheduler);

		assert_eq!(Arc::strong_count(&pixels), 1);
	}

	#[test]
	fn reset() {
		let recorder = Recorder::default();
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(recorder.clone());

		let start = Instant::now();
		scheduler.enqueue_at(frame(0, &pixels), start);
		scheduler.enqueue_at(frame(40, &pixels), start);
		scheduler.reset();

		assert!(scheduler.is_empty());
		assert!(scheduler.start_wall_clock().is_none());
		assert!(scheduler.first_timestamp().is_none());
		assert_eq!(Arc::strong_count(&pixels), 1);

		// The next frame pins a new clock.
		let later = start + ms(10_000);
		scheduler.enqueue_at(frame(5000, &pixels), later);
		scheduler.enqueue_at(frame(5040, &pixels), later);

		assert_eq!(scheduler.start_wall_clock(), Some(later));
		assert_eq!(scheduler.first_timestamp(), Some(Timestamp::from_millis(5000).unwrap()));
		assert_eq!(scheduler.tick_at(later + ms(39)), 1);
		assert_eq!(recorder.rendered(), [5000]);
	}

	#[test]
	#[tracing_test::traced_test]
	fn render_errors_release() {
		let recorder = Recorder {
			fail: true,
			..Default::default()
		};
		let pixels = Arc::new(vec![0u8]);
		let mut scheduler = Scheduler::new(recorder);

		let start = Instant::now();
		scheduler.enqueue_at(frame(0, &pixels), start);
		scheduler.enqueue_at(frame(40, &pixels), start);

		assert_eq!(scheduler.tick_at(start + ms(100)), 0);
		assert!(scheduler.is_empty());
		assert_eq!(Arc::strong_count(&pixels), 1);
		assert_eq!(scheduler.stats().released, 2);
		assert!(logs_contain("failed to render frame"));
	}
}
