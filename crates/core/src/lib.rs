//! Core library for the PiLites cue engine.
//!
//! A play is an ordered list of cues that assign effects to regions of LED
//! strips. The crate renders effects, composites them into per-channel
//! frames, and runs the preview and live sessions that stream those frames
//! to observers and to the hardware. Each module owns one subsystem; the
//! [`Controller`] wires them together for outer surfaces.

pub mod broadcast;
pub mod color;
pub mod compositor;
pub mod config;
pub mod control;
pub mod effects;
pub mod error;
pub mod hardware;
pub mod model;
pub mod session;
pub mod storage;
pub mod timeline;
pub mod tracking;

pub use broadcast::{Broadcaster, Message, Observer, ObserverId, Subscription};
pub use color::Rgb;
pub use compositor::{build_frame, compose, Frame};
pub use config::AppConfig;
pub use control::Controller;
pub use effects::EffectKind;
pub use error::{PiLitesError, Result};
pub use hardware::{create_sink, MockSink, PixelSink};
pub use model::{Channel, ColorOrder, Cue, Effect, PixelRange, Play, PlaySummary, Region};
pub use session::{LiveSession, LiveStatus, PreviewSession, PreviewStatus};
pub use storage::{FileStore, PlayStore};
pub use timeline::{CueClock, FrameTimer};
pub use tracking::resolve_effect;
