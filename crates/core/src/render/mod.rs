//! Event dispatcher and the two interchangeable synthesis paths it drives.

mod audio;
mod video;

use std::io::Write;

use crate::{
    chart::{EventKind, EventSequence},
    timeline::TickClock,
    Result,
};

pub use audio::AudioMixer;
pub use video::{composite, VideoCompositor};

/// Tolerance applied to frame and sample boundaries so that a boundary
/// landing exactly on an event time belongs to the interval before it.
pub const BOUNDARY_EPSILON: f64 = 1e-6;

/// Fixed video cadence of the output stream.
pub const VIDEO_FPS: u32 = 30;

/// Virtual time added per iteration while draining ringing voices after the
/// last chart event: one video frame.
pub const DRAIN_STEP_SECONDS: f64 = 1.0 / VIDEO_FPS as f64;

/// Everything the dispatcher threads through a render: the clock, the
/// active BGA layers and how much output has been synthesised so far.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub clock: TickClock,
    pub base: Option<usize>,
    pub layer: Option<usize>,
    pub frames: u64,
    pub samples: u64,
}

impl RenderState {
    pub fn new(initial_tempo: f64) -> Self {
        Self {
            clock: TickClock::new(initial_tempo),
            base: None,
            layer: None,
            frames: 0,
            samples: 0,
        }
    }

    pub fn time_seconds(&self) -> f64 {
        self.clock.time_seconds()
    }
}

/// A synthesis path. The dispatcher calls [`Synthesizer::advance`] whenever
/// virtual time moves; implementations emit every frame or sample-frame
/// that now lies in the past.
pub trait Synthesizer {
    fn advance(&mut self, state: &mut RenderState, sink: &mut dyn Write) -> Result<()>;

    /// A note event (re)starts the keysound in `slot`.
    fn trigger(&mut self, _slot: usize) {}

    /// True while output is still pending after the last event.
    fn is_ringing(&self) -> bool {
        false
    }
}

/// Walks `events` once, synthesising each interval before applying the
/// event that ends it, then drains ringing voices.
pub fn dispatch(
    events: &EventSequence,
    initial_tempo: f64,
    synth: &mut dyn Synthesizer,
    sink: &mut dyn Write,
) -> Result<RenderState> {
    let mut state = RenderState::new(initial_tempo);
    let mut prev_pos = 0;

    for event in events {
        state.clock.advance(event.pos.saturating_sub(prev_pos));
        prev_pos = event.pos;
        synth.advance(&mut state, sink)?;

        match event.kind {
            EventKind::TempoChange { bpm } if bpm > 0.0 => state.clock.set_tempo(bpm),
            EventKind::TempoChange { bpm } => {
                tracing::warn!(pos = event.pos, bpm, "ignoring non-positive tempo");
            }
            EventKind::BgaBaseChange { slot } => state.base = Some(slot),
            EventKind::BgaLayerChange { slot } => state.layer = Some(slot),
            EventKind::Note { slot } | EventKind::NoteLong { slot } => synth.trigger(slot),
        }
    }

    let mut drain_steps = 0u64;
    while synth.is_ringing() {
        state.clock.advance_seconds(DRAIN_STEP_SECONDS);
        synth.advance(&mut state, sink)?;
        drain_steps += 1;
    }
    if drain_steps > 0 {
        tracing::debug!(drain_steps, "drained trailing voices");
    }

    Ok(state)
}
