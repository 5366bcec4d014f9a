use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use bga_render_core::{AssetPolicy, RenderConfig, RenderMode, RenderSession};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> bga_render_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.config()?;
    let session = RenderSession::load(&cli.chart, config)?;

    let summary = match &cli.output {
        Some(path) => {
            tracing::info!(?path, "writing raw stream to file");
            session.render(File::create(path)?)?
        }
        None => session.render(io::stdout().lock())?,
    };

    if let Some(path) = &cli.summary {
        summary.write_json(path)?;
        tracing::info!(?path, "wrote render summary");
    }
    io::stderr().flush()?;
    Ok(())
}

/// Logs go to stderr; stdout may carry the rendered stream.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Render a BMS chart's BGA or keysounds into a raw RGB24 or PCM16 stream",
    long_about = None
)]
struct Cli {
    /// Render background animation as raw RGB24 frames (default).
    #[arg(short = 'v', long, conflicts_with = "audio")]
    video: bool,

    /// Render keysounds as raw interleaved s16le PCM.
    #[arg(short = 'a', long)]
    audio: bool,

    /// Write the stream to a file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON render configuration; flags given here override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Leave undecodable or mismatched assets out instead of aborting.
    #[arg(long)]
    skip_missing_assets: bool,

    /// Write a JSON description of the produced stream.
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Chart file to render.
    chart: PathBuf,
}

impl Cli {
    fn config(&self) -> bga_render_core::Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::from_json_file(path)?,
            None => RenderConfig::default(),
        };
        if self.audio {
            config.mode = RenderMode::Audio;
        } else if self.video {
            config.mode = RenderMode::Video;
        }
        if self.skip_missing_assets {
            config.asset_policy = AssetPolicy::Skip;
        }
        Ok(config)
    }
}
