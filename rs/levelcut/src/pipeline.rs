//! Drives one video from container bytes to a segment plan.
//!
//! Decoding runs on a blocking thread and hands frames over a bounded channel.
//! A single task owns the [Scheduler], the [Sampler] and the [Debounce], so none of them need locks.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::decode::{DecodeEngine, DecodeEvent, Decoder};
use crate::marker::{Debounce, MarkerChangeEvent};
use crate::plan::{NoMarkers, Segment};
use crate::recognize::Recognizer;
use crate::render::Legibility;
use crate::sampler::{Sampler, SAMPLE_PERIOD};
use crate::source::{Demuxed, SampleSource};
use crate::{Bitmap, Error, RenderTarget, Result, Scheduler};

/// Roughly one display refresh at 60Hz.
pub const TICK_INTERVAL: Duration = Duration::from_micros(16_667);

/// The number of decoded frames buffered ahead of presentation.
pub const MAX_QUEUED: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct PipelineConfig {
	/// How often the rendered output is captured for recognition.
	#[serde(with = "humantime_serde")]
	pub sample_period: Duration,

	/// How often due frames are presented.
	#[serde(with = "humantime_serde")]
	pub tick_interval: Duration,

	/// Media time per unit of wall-clock time; 2.0 plays twice as fast.
	pub time_scale: f64,

	/// Decoded frames buffered ahead of presentation before decoding blocks.
	pub max_queued: usize,

	/// Consecutive sightings needed before a new marker is accepted.
	pub confirmations: u32,

	/// Binarize and blur captures before recognition.
	pub legibility: bool,

	/// What to plan when no marker was ever recognized.
	pub no_markers: NoMarkers,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			sample_period: SAMPLE_PERIOD,
			tick_interval: TICK_INTERVAL,
			time_scale: 1.0,
			max_queued: MAX_QUEUED,
			confirmations: 1,
			legibility: true,
			no_markers: NoMarkers::Skip,
		}
	}
}

/// The lifecycle of a [Pipeline]. A pipeline only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
	Idle,
	Demuxing,
	Decoding,
	Draining,
	Segmenting,
	Done,
	Failed,
}

impl PipelineState {
	pub fn is_finished(&self) -> bool {
		matches!(self, Self::Done | Self::Failed)
	}
}

/// Everything learned from one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
	pub duration_ms: f64,
	pub events: Vec<MarkerChangeEvent>,
	pub segments: Vec<Segment>,
}

/// Processes a single video. A second [Pipeline::run] fails instead of starting over.
pub struct Pipeline<S: SampleSource, R: Recognizer> {
	config: PipelineConfig,
	source: S,
	recognizer: Arc<R>,
	state: watch::Sender<PipelineState>,
}

impl<S: SampleSource, R: Recognizer> Pipeline<S, R> {
	pub fn new(config: PipelineConfig, source: S, recognizer: R) -> Self {
		Self {
			config,
			source,
			recognizer: Arc::new(recognizer),
			state: watch::Sender::new(PipelineState::Idle),
		}
	}

	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	pub fn state(&self) -> PipelineState {
		*self.state.borrow()
	}

	/// Watch state transitions.
	pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
		self.state.subscribe()
	}

	/// Demux, decode and present `input`, returning the recognized markers and planned segments.
	///
	/// Returns [Error::Busy] if a run is in progress and [Error::Finished] if one already completed.
	/// Dropping the future cancels the run and marks the pipeline as failed.
	pub async fn run<D, T>(&self, input: Bytes, decoder: D, target: T) -> Result<Outcome>
	where
		D: Decoder + 'static,
		T: RenderTarget,
	{
		self.begin()?;

		let mut running = Running {
			state: &self.state,
			succeeded: false,
		};

		match self.process(input, decoder, target).await {
			Ok(outcome) => {
				running.succeeded = true;
				self.transition(PipelineState::Done);

				tracing::info!(
					events = outcome.events.len(),
					segments = outcome.segments.len(),
					"pipeline done"
				);
				Ok(outcome)
			}
			Err(err) => {
				tracing::warn!(%err, "pipeline failed");
				Err(err)
			}
		}
	}

	fn begin(&self) -> Result<()> {
		let mut previous = PipelineState::Idle;

		self.state.send_if_modified(|state| {
			previous = *state;
			if previous != PipelineState::Idle {
				return false;
			}

			*state = PipelineState::Demuxing;
			true
		});

		match previous {
			PipelineState::Idle => Ok(()),
			state if state.is_finished() => Err(Error::Finished),
			_ => Err(Error::Busy),
		}
	}

	fn transition(&self, state: PipelineState) {
		tracing::debug!(?state, "pipeline state");
		self.state.send_replace(state);
	}

	async fn process<D, T>(&self, input: Bytes, decoder: D, target: T) -> Result<Outcome>
	where
		D: Decoder + 'static,
		T: RenderTarget,
	{
		let Demuxed {
			codec,
			duration_ms,
			samples,
		} = self.source.demux(input)?;

		self.transition(PipelineState::Decoding);

		let max_queued = self.config.max_queued.max(1);
		let (tx, mut rx) = mpsc::channel(max_queued);

		let mut engine = DecodeEngine::new(decoder, tx);
		engine.configure(codec)?;

		// There's no aborting a blocking task; it stops at the next send once `rx` is dropped.
		let mut decoding = tokio::task::spawn_blocking(move || engine.run(samples));

		let mut scheduler = Scheduler::with_time_scale(target, self.config.time_scale);
		let mut sampler = Sampler::new(self.recognizer.clone(), self.config.sample_period);
		let mut debounce = Debounce::with_confirmations(self.config.confirmations);
		let legibility = self.config.legibility.then(Legibility::default);

		let mut render = tokio::time::interval(self.config.tick_interval.max(Duration::from_millis(1)));
		render.set_missed_tick_behavior(MissedTickBehavior::Skip);
		let mut sampling = sampler.interval();

		let mut receiving = true;
		let mut decoded = None;

		// Frames rendered as of the most recent capture.
		let mut captured = 0;

		while receiving || decoded.is_none() || !scheduler.is_empty() {
			tokio::select! {
				event = rx.recv(), if receiving && scheduler.len() < max_queued => match event {
					Some(DecodeEvent::Frame(frame)) => scheduler.enqueue(frame),
					Some(DecodeEvent::Draining) => self.transition(PipelineState::Draining),
					None => receiving = false,
				},
				res = &mut decoding, if decoded.is_none() => {
					let emitted = res.map_err(|err| Error::Decode(err.to_string()))??;
					tracing::debug!(emitted, "decoding finished");
					decoded = Some(emitted);
				}
				_ = render.tick() => {
					scheduler.tick();
				}
				_ = sampling.tick(), if scheduler.stats().rendered > 0 => {
					if sampler.fire(Instant::now(), || capture(scheduler.target(), legibility.as_ref())) {
						captured = scheduler.stats().rendered;
					}
				}
				Some(sample) = sampler.completed() => {
					debounce.observe(&sample, scheduler.clock());
				}
			}
		}

		// The last capture may still be in flight.
		if let Some(sample) = sampler.completed().await {
			debounce.observe(&sample, scheduler.clock());
		}

		// The tail may have been rendered after the last capture, ex. in one catch-up tick.
		if scheduler.stats().rendered > captured {
			tracing::debug!(rendered = scheduler.stats().rendered, captured, "capturing the final frame");

			sampler.fire(Instant::now(), || capture(scheduler.target(), legibility.as_ref()));
			if let Some(sample) = sampler.completed().await {
				debounce.observe(&sample, scheduler.clock());
			}
		}

		scheduler.stop();

		tracing::debug!(scheduler = ?scheduler.stats(), sampler = ?sampler.stats(), "presentation finished");

		self.transition(PipelineState::Segmenting);

		let events = debounce.into_events();
		let segments = crate::plan::plan_with(&events, duration_ms, self.config.no_markers);

		Ok(Outcome {
			duration_ms,
			events,
			segments,
		})
	}
}

fn capture<T: RenderTarget>(target: &T, legibility: Option<&Legibility>) -> Option<Bitmap> {
	let bitmap = target.capture()?;
	Some(match legibility {
		Some(legibility) => legibility.apply(&bitmap),
		None => bitmap,
	})
}

// Marks the pipeline as failed unless the run succeeded, including when the run is cancelled.
struct Running<'a> {
	state: &'a watch::Sender<PipelineState>,
	succeeded: bool,
}

impl Drop for Running<'_> {
	fn drop(&mut self) {
		if !self.succeeded {
			self.state.send_replace(PipelineState::Failed);
		}
	}
}
