//! Decoded bitmap and wave handles, addressed by the slot ids charts use.

pub mod bitmap;
pub mod wave;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{chart::SLOT_COUNT, AssetPolicy, RenderError, Result};

pub use bitmap::BitmapAsset;
pub use wave::{WaveAsset, WaveFormat};

/// One entry of a [`SlotTable`].
#[derive(Debug, Clone)]
pub enum Slot<T> {
    Absent,
    Loaded(T),
}

/// Fixed-capacity, sparse table indexed by chart slot id. Filled once before
/// rendering and only read afterwards.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotTable<T> {
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| Slot::Absent).collect(),
        }
    }

    /// Stores `asset` at `slot`. Ids outside the table are ignored.
    pub fn insert(&mut self, slot: usize, asset: T) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Slot::Loaded(asset);
        }
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        match self.slots.get(slot) {
            Some(Slot::Loaded(asset)) => Some(asset),
            _ => None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn loaded(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(id, slot)| match slot {
            Slot::Loaded(asset) => Some((id, asset)),
            Slot::Absent => None,
        })
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded().count()
    }
}

/// Bitmaps of one session. All share the canvas size of the first one that
/// loaded.
#[derive(Debug, Default)]
pub struct BitmapSet {
    pub slots: SlotTable<BitmapAsset>,
    pub canvas: Option<(u32, u32)>,
}

/// Resolves chart file names against the chart directory and fills slot
/// tables, applying one [`AssetPolicy`] to every failure.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    base_dir: PathBuf,
    policy: AssetPolicy,
}

impl AssetLoader {
    pub fn new(base_dir: impl Into<PathBuf>, policy: AssetPolicy) -> Self {
        Self {
            base_dir: base_dir.into(),
            policy,
        }
    }

    pub fn load_bitmaps(&self, names: &BTreeMap<usize, String>) -> Result<BitmapSet> {
        let mut set = BitmapSet::default();
        for (&slot, name) in names {
            let path = self.base_dir.join(normalize_separators(name));
            let loaded = bitmap::decode(&path).and_then(|asset| match set.canvas {
                None => Ok(asset),
                Some((w, h)) if asset.width == w && asset.height == h => Ok(asset),
                Some((w, h)) => Err(RenderError::BitmapSize {
                    path: path.clone(),
                    width: asset.width,
                    height: asset.height,
                    expected_width: w,
                    expected_height: h,
                }),
            });

            match loaded {
                Ok(asset) => {
                    if set.canvas.is_none() {
                        tracing::info!(
                            width = asset.width,
                            height = asset.height,
                            "image size established"
                        );
                        set.canvas = Some((asset.width, asset.height));
                    }
                    set.slots.insert(slot, asset);
                }
                Err(err) => self.on_failure(slot, err)?,
            }
        }
        Ok(set)
    }

    pub fn load_waves(
        &self,
        names: &BTreeMap<usize, String>,
        format: WaveFormat,
    ) -> Result<SlotTable<WaveAsset>> {
        let mut table = SlotTable::new();
        for (&slot, name) in names {
            match wave::load(&self.base_dir, name, format) {
                Ok(asset) => table.insert(slot, asset),
                Err(err) => self.on_failure(slot, err)?,
            }
        }
        Ok(table)
    }

    fn on_failure(&self, slot: usize, err: RenderError) -> Result<()> {
        match self.policy {
            AssetPolicy::Abort => Err(err),
            AssetPolicy::Skip => {
                tracing::warn!(slot, error = %err, "skipping asset");
                Ok(())
            }
        }
    }
}

/// Charts authored on Windows reference files with backslashes.
pub(crate) fn normalize_separators(name: &str) -> String {
    name.replace('\\', "/")
}
