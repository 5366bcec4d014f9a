//! Chart model consumed by the renderer, plus the BMS text parser that
//! produces it.

mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

pub use parser::{decode_text, parse};

/// Number of addressable asset slots: two base-36 digits.
pub const SLOT_COUNT: usize = 36 * 36;

/// Side effect carried by a [`ChartEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Note { slot: usize },
    NoteLong { slot: usize },
    TempoChange { bpm: f64 },
    BgaBaseChange { slot: usize },
    BgaLayerChange { slot: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartEvent {
    /// Tick offset from the start of the chart.
    pub pos: u64,
    pub kind: EventKind,
}

impl ChartEvent {
    pub fn new(pos: u64, kind: EventKind) -> Self {
        Self { pos, kind }
    }
}

/// Events ordered ascending by position. Events that share a position keep
/// the order they were given in.
#[derive(Debug, Clone, Default)]
pub struct EventSequence {
    events: Vec<ChartEvent>,
}

impl EventSequence {
    pub fn new(mut events: Vec<ChartEvent>) -> Self {
        events.sort_by_key(|event| event.pos);
        Self { events }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChartEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<'a> IntoIterator for &'a EventSequence {
    type Item = &'a ChartEvent;
    type IntoIter = std::slice::Iter<'a, ChartEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// File names declared by `#WAVxx` / `#BMPxx`, keyed by slot.
#[derive(Debug, Clone, Default)]
pub struct AssetTables {
    pub wav: BTreeMap<usize, String>,
    pub bmp: BTreeMap<usize, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartMeta {
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub initial_tempo: f64,
}

impl Default for ChartMeta {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            genre: String::new(),
            initial_tempo: 130.0,
        }
    }
}

/// Parser warning. Never changes what gets rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedChart {
    pub events: EventSequence,
    pub tables: AssetTables,
    pub meta: ChartMeta,
    pub diagnostics: Vec<Diagnostic>,
}

/// Reads and parses a chart file. Unreadable or undecodable input is fatal.
pub fn load(path: &Path) -> Result<ParsedChart> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::ChartRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode_text(&bytes).ok_or_else(|| RenderError::ChartDecode {
        path: path.to_path_buf(),
    })?;
    Ok(parse(&text))
}
