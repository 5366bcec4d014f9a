//! Core library for rendering rhythm-game charts into raw media streams.
//!
//! A chart is a tempo-mapped timeline of BGA and keysound cues. The crate
//! walks that timeline once and, in lockstep, either composites RGB24 video
//! frames or mixes PCM16 audio, writing a headerless stream meant for an
//! external encoder. Each module owns one stage: chart parsing, asset
//! decoding, timing, synthesis and output.

pub mod assets;
pub mod chart;
pub mod config;
pub mod error;
pub mod record;
pub mod render;
pub mod session;
pub mod timeline;

pub use assets::{AssetLoader, BitmapAsset, BitmapSet, Slot, SlotTable, WaveAsset, WaveFormat};
pub use chart::{ChartEvent, ChartMeta, Diagnostic, EventKind, EventSequence, ParsedChart};
pub use config::{AssetPolicy, AudioConfig, RenderConfig, RenderMode, VideoConfig};
pub use error::{RenderError, Result};
pub use record::{Recorder, RenderSummary};
pub use render::{dispatch, AudioMixer, RenderState, Synthesizer, VideoCompositor, VIDEO_FPS};
pub use session::RenderSession;
pub use timeline::{TickClock, TICKS_PER_BEAT};
