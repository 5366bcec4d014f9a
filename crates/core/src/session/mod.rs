use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{
    assets::{AssetLoader, WaveFormat},
    chart::{self, ParsedChart},
    record::{AudioStreamInfo, Recorder, RenderSummary, VideoStreamInfo},
    render::{dispatch, AudioMixer, RenderState, Synthesizer, VideoCompositor, VIDEO_FPS},
    RenderConfig, RenderMode, Result,
};

/// One render run: a parsed chart, the directory its assets live in and the
/// configuration that selects the synthesis path.
#[derive(Debug)]
pub struct RenderSession {
    chart: ParsedChart,
    base_dir: PathBuf,
    config: RenderConfig,
}

impl RenderSession {
    /// Reads and parses `chart_path`. Diagnostics are logged and otherwise
    /// ignored.
    pub fn load(chart_path: &Path, config: RenderConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(path = %chart_path.display(), "loading chart");
        let chart = chart::load(chart_path)?;
        for diagnostic in &chart.diagnostics {
            tracing::warn!(line = diagnostic.line, "{}", diagnostic.message);
        }

        let base_dir = chart_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self::from_parsed(chart, base_dir, config))
    }

    pub fn from_parsed(chart: ParsedChart, base_dir: PathBuf, config: RenderConfig) -> Self {
        tracing::info!(
            title = %chart.meta.title,
            artist = %chart.meta.artist,
            tempo = chart.meta.initial_tempo,
            events = chart.events.len(),
            "chart ready"
        );
        Self {
            chart,
            base_dir,
            config,
        }
    }

    /// Loads the assets the selected mode needs, then renders into `sink`.
    ///
    /// Asset failures under the abort policy return before a single byte is
    /// written.
    pub fn render<W: Write>(&self, sink: W) -> Result<RenderSummary> {
        let loader = AssetLoader::new(&self.base_dir, self.config.asset_policy);
        let tables = &self.chart.tables;

        match self.config.mode {
            RenderMode::Video => {
                tracing::info!(count = tables.bmp.len(), "loading bitmaps");
                let bitmaps = loader.load_bitmaps(&tables.bmp)?;
                let video = &self.config.video;
                if bitmaps.canvas.is_none() {
                    tracing::warn!(
                        width = video.fallback_width,
                        height = video.fallback_height,
                        "no bitmap loaded, rendering black frames"
                    );
                }
                let mut compositor =
                    VideoCompositor::new(bitmaps, (video.fallback_width, video.fallback_height));
                let (width, height) = compositor.canvas();
                let (mut summary, state) = self.run(&mut compositor, sink)?;
                summary.video = Some(VideoStreamInfo {
                    width,
                    height,
                    fps: VIDEO_FPS,
                    frames: state.frames,
                    pixel_format: "rgb24".into(),
                });
                Ok(summary)
            }
            RenderMode::Audio => {
                let format = WaveFormat::from(&self.config.audio);
                tracing::info!(
                    count = tables.wav.len(),
                    channels = format.channels,
                    sample_rate = format.sample_rate,
                    "loading waves"
                );
                let waves = loader.load_waves(&tables.wav, format)?;
                let mut mixer = AudioMixer::new(waves, format)?;
                let (mut summary, state) = self.run(&mut mixer, sink)?;
                summary.audio = Some(AudioStreamInfo {
                    channels: format.channels,
                    sample_rate: format.sample_rate,
                    sample_frames: state.samples,
                    sample_format: "s16le".into(),
                });
                Ok(summary)
            }
        }
    }

    fn run<W: Write>(
        &self,
        synth: &mut dyn Synthesizer,
        sink: W,
    ) -> Result<(RenderSummary, RenderState)> {
        let mut recorder = Recorder::new(sink);
        let state = dispatch(
            &self.chart.events,
            self.chart.meta.initial_tempo,
            synth,
            &mut recorder,
        )?;
        let bytes_written = recorder.bytes_written();
        recorder.finish()?;

        tracing::info!(
            frames = state.frames,
            sample_frames = state.samples,
            seconds = state.time_seconds(),
            bytes = bytes_written,
            "render finished"
        );
        let summary = RenderSummary {
            mode: self.config.mode,
            duration_seconds: state.time_seconds(),
            bytes_written,
            video: None,
            audio: None,
        };
        Ok((summary, state))
    }
}
