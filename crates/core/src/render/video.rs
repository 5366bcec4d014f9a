use std::io::Write;

use super::{RenderState, Synthesizer, BOUNDARY_EPSILON, VIDEO_FPS};
use crate::{
    assets::{BitmapAsset, BitmapSet, SlotTable},
    Result,
};

/// Emits one RGB24 frame per frame boundary, compositing the active base
/// bitmap with the black-keyed overlay.
#[derive(Debug)]
pub struct VideoCompositor {
    bitmaps: SlotTable<BitmapAsset>,
    width: u32,
    height: u32,
    frame: Vec<u8>,
}

impl VideoCompositor {
    /// `fallback` sizes the canvas when no bitmap was loaded.
    pub fn new(bitmaps: BitmapSet, fallback: (u32, u32)) -> Self {
        let (width, height) = bitmaps.canvas.unwrap_or(fallback);
        Self {
            bitmaps: bitmaps.slots,
            width,
            height,
            frame: vec![0; width as usize * height as usize * 3],
        }
    }

    pub fn canvas(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Synthesizer for VideoCompositor {
    fn advance(&mut self, state: &mut RenderState, sink: &mut dyn Write) -> Result<()> {
        let boundary = state.time_seconds() * f64::from(VIDEO_FPS) - BOUNDARY_EPSILON;
        while (state.frames as f64) < boundary {
            let base = state.base.and_then(|slot| self.bitmaps.get(slot));
            let layer = state.layer.and_then(|slot| self.bitmaps.get(slot));
            composite(&mut self.frame, base, layer);
            sink.write_all(&self.frame)?;
            state.frames += 1;
        }
        Ok(())
    }
}

/// Fills `frame` with `base` (or black) and copies every overlay pixel that
/// is not pure black on top of it.
pub fn composite(frame: &mut [u8], base: Option<&BitmapAsset>, layer: Option<&BitmapAsset>) {
    match base {
        Some(base) => frame.copy_from_slice(&base.pixels),
        None => frame.fill(0),
    }

    if let Some(layer) = layer {
        for (dst, src) in frame.chunks_exact_mut(3).zip(layer.pixels.chunks_exact(3)) {
            if src.iter().any(|&c| c != 0) {
                dst.copy_from_slice(src);
            }
        }
    }
}
