//! # levelcut: split gameplay recordings at on-screen level changes
//!
//! `levelcut` plays a recording back against the wall clock, periodically reads the rendered
//! output with OCR, and records every point where the on-screen `WORLD x-y` marker changes.
//! Those change points become a segment plan that can be cut out of the source without re-encoding.
//!
//! ## Overview
//!
//! - **Source**: Demux a container into a codec configuration and encoded samples.
//! - **Decode**: Turn samples into frames on a blocking thread, in presentation order.
//! - **Scheduler**: Present each frame once it's due, pinning the presentation clock to the first frame.
//! - **Sampler**: Capture the rendered output at a fixed period, with at most one recognition in flight.
//! - **Marker**: Debounce recognized text into an append-only list of marker changes.
//! - **Plan**: Turn marker changes into contiguous segments.
//! - **Cut**: Write each segment with the `ffmpeg` command line tool.
//!
//! [Pipeline] ties all of these together for a single video.
mod error;

pub mod cut;
pub mod decode;
pub mod marker;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod recognize;
pub mod render;
pub mod sampler;
pub mod scheduler;
pub mod source;

pub use error::*;
pub use model::*;

pub use marker::{Marker, MarkerChangeEvent};
pub use pipeline::{Outcome, Pipeline, PipelineConfig, PipelineState};
pub use plan::{Length, NoMarkers, Segment};
pub use render::{Bitmap, RenderTarget};
pub use scheduler::{PresentationClock, Scheduler};
