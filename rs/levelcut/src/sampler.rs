//! Periodic, non-overlapping recognition of the rendered output.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::recognize::{RecognitionError, RecognitionSample, Recognizer};
use crate::Bitmap;

/// The default time between captures.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
	/// Requests handed to the recognizer.
	pub submitted: u64,

	/// Captures dropped because a request was still outstanding.
	pub skipped: u64,

	/// Requests that failed and were treated as empty text.
	pub failed: u64,
}

/// Submits captures to a [Recognizer], at most one at a time.
///
/// Each request runs on its own task, so a slow recognizer never stalls presentation.
/// Dropping the sampler detaches any outstanding request; it completes and the result is discarded.
pub struct Sampler<R: Recognizer> {
	recognizer: Arc<R>,
	period: Duration,
	outstanding: Option<(Instant, JoinHandle<Result<String, RecognitionError>>)>,
	stats: SamplerStats,
}

impl<R: Recognizer> Sampler<R> {
	pub fn new(recognizer: Arc<R>, period: Duration) -> Self {
		Self {
			recognizer,
			period,
			outstanding: None,
			stats: SamplerStats::default(),
		}
	}

	/// A timer firing every period, skipping missed firings instead of bursting.
	pub fn interval(&self) -> Interval {
		let mut interval = tokio::time::interval(self.period.max(Duration::from_millis(1)));
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
		interval
	}

	pub fn period(&self) -> Duration {
		self.period
	}

	pub fn is_busy(&self) -> bool {
		self.outstanding.is_some()
	}

	pub fn stats(&self) -> SamplerStats {
		self.stats
	}

	/// Start recognizing a bitmap captured at `captured_at`.
	///
	/// Returns false, without doing anything, if a request is already outstanding.
	pub fn submit(&mut self, bitmap: Bitmap, captured_at: Instant) -> bool {
		self.fire(captured_at, || Some(bitmap))
	}

	/// Like [Self::submit], but only calls `capture` if the sampler is idle.
	///
	/// Returns false if a request is outstanding or there was nothing to capture.
	pub fn fire(&mut self, captured_at: Instant, capture: impl FnOnce() -> Option<Bitmap>) -> bool {
		if self.outstanding.is_some() {
			self.stats.skipped += 1;
			tracing::trace!(skipped = self.stats.skipped, "recognition still outstanding, skipping capture");
			return false;
		}

		let Some(bitmap) = capture() else {
			return false;
		};

		let recognizer = self.recognizer.clone();
		let handle = tokio::spawn(async move { recognizer.recognize(bitmap).await });

		self.stats.submitted += 1;
		self.outstanding = Some((captured_at, handle));

		true
	}

	/// Wait for the outstanding request, if any.
	///
	/// Cancel safe: if the future is dropped, the request stays outstanding.
	/// Failures are logged and reported as empty text.
	pub async fn completed(&mut self) -> Option<RecognitionSample> {
		let (captured_at, handle) = self.outstanding.as_mut()?;
		let captured_at = *captured_at;

		let res = handle.await;
		self.outstanding = None;

		let text = match res {
			Ok(Ok(text)) => text,
			Ok(Err(err)) => {
				tracing::warn!(%err, "recognition failed");
				self.stats.failed += 1;
				String::new()
			}
			Err(err) => {
				tracing::warn!(%err, "recognition task failed");
				self.stats.failed += 1;
				String::new()
			}
		};

		tracing::debug!(text = text.trim(), "recognized");

		Some(RecognitionSample { captured_at, text })
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Default)]
	struct Slow {
		finished: AtomicUsize,
		fail: bool,
	}

	impl Recognizer for Slow {
		async fn recognize(&self, bitmap: Bitmap) -> Result<String, RecognitionError> {
			tokio::time::sleep(Duration::from_millis(100)).await;
			self.finished.fetch_add(1, Ordering::SeqCst);

			if self.fail {
				return Err(std::io::Error::other("unreadable").into());
			}

			Ok(format!("WORLD {}-1", bitmap.width()))
		}
	}

	#[tokio::test(start_paused = true)]
	async fn one_at_a_time() {
		let mut sampler = Sampler::new(Arc::new(Slow::default()), SAMPLE_PERIOD);
		assert!(sampler.completed().await.is_none());

		let first = Instant::now();
		assert!(sampler.submit(Bitmap::new(1, 1), first));
		assert!(sampler.is_busy());

		// Skipped while the first request is outstanding.
		assert!(!sampler.submit(Bitmap::new(2, 2), first + Duration::from_millis(10)));

		let sample = sampler.completed().await.unwrap();
		assert_eq!(sample.captured_at, first);
		assert_eq!(sample.text, "WORLD 1-1");
		assert!(!sampler.is_busy());

		assert!(sampler.submit(Bitmap::new(3, 3), Instant::now()));
		assert_eq!(sampler.completed().await.unwrap().text, "WORLD 3-1");

		assert_eq!(
			sampler.stats(),
			SamplerStats {
				submitted: 2,
				skipped: 1,
				failed: 0,
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn completed_is_cancel_safe() {
		let mut sampler = Sampler::new(Arc::new(Slow::default()), SAMPLE_PERIOD);
		sampler.submit(Bitmap::new(1, 1), Instant::now());

		tokio::select! {
			_ = sampler.completed() => panic!("completed too early"),
			_ = tokio::time::sleep(Duration::from_millis(10)) => {}
		}

		assert!(sampler.is_busy());
		assert_eq!(sampler.completed().await.unwrap().text, "WORLD 1-1");
	}

	#[tokio::test(start_paused = true)]
	#[tracing_test::traced_test]
	async fn failure_is_empty() {
		let slow = Slow {
			fail: true,
			..Default::default()
		};
		let mut sampler = Sampler::new(Arc::new(slow), SAMPLE_PERIOD);
		sampler.submit(Bitmap::new(1, 1), Instant::now());

		let sample = sampler.completed().await.unwrap();
		assert_eq!(sample.text, "");
		assert_eq!(sampler.stats().failed, 1);
		assert!(logs_contain("recognition failed"));
	}

	#[tokio::test(start_paused = true)]
	async fn drop_detaches() {
		let slow = Arc::new(Slow::default());
		let mut sampler = Sampler::new(slow.clone(), SAMPLE_PERIOD);
		sampler.submit(Bitmap::new(1, 1), Instant::now());
		drop(sampler);

		// The request still runs to completion; nobody observes the result.
		tokio::time::sleep(Duration::from_millis(200)).await;
		assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
	}
}
