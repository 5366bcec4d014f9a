use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{RenderMode, Result};

/// Ordered byte sink for synthesised media. Buffers writes, counts every
/// byte that passes through and flushes on [`Recorder::finish`].
#[derive(Debug)]
pub struct Recorder<W: Write> {
    writer: BufWriter<W>,
    bytes_written: u64,
}

impl<W: Write> Recorder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(1 << 16, inner),
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes buffered output and returns the inner writer.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| err.into_error().into())
    }
}

impl<W: Write> Write for Recorder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// What a finished render produced, so a downstream encoder can interpret
/// the headerless stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub mode: RenderMode,
    pub duration_seconds: f64,
    pub bytes_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoStreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioStreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u64,
    pub pixel_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_frames: u64,
    pub sample_format: String,
}

impl RenderSummary {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::from)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
