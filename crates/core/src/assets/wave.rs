//! Keysound decoding into the mixer's fixed PCM16 format.
//!
//! Every supported container decodes to interleaved `f32` first, then gets
//! remapped to the target channel count and resampled with linear
//! interpolation before being quantised to `i16`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::{AudioConfig, RenderError, Result};

/// Extensions tried, in order, for every wave a chart references. The
/// declared extension is discarded since charts often ship re-encoded audio.
const WAVE_EXTENSIONS: &[&str] = &[".ogg", ".wav", ".mp3", ".OGG", ".WAV", ".MP3"];

/// Channel count and sample rate shared by every decoded wave and the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for WaveFormat {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for WaveFormat {
    fn from(config: &AudioConfig) -> Self {
        Self {
            channels: config.channels,
            sample_rate: config.sample_rate,
        }
    }
}

/// Interleaved PCM16 buffer in a known [`WaveFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveAsset {
    pub format: WaveFormat,
    pub samples: Vec<i16>,
}

impl WaveAsset {
    pub fn new(format: WaveFormat, samples: Vec<i16>) -> Self {
        Self { format, samples }
    }

    /// Number of sample-frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }
}

/// Finds the first `<stem><ext>` under `base_dir` that decodes.
pub fn load(base_dir: &Path, name: &str, format: WaveFormat) -> Result<WaveAsset> {
    let mut last_error = None;
    for candidate in candidates(base_dir, name) {
        if !candidate.is_file() {
            continue;
        }
        match decode(&candidate, format) {
            Ok(wave) => return Ok(wave),
            Err(err) => {
                tracing::debug!(
                    path = %candidate.display(),
                    error = %err,
                    "wave candidate rejected"
                );
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| RenderError::WaveNotFound {
        name: name.to_string(),
    }))
}

/// Paths tried for `name`, in resolution order.
pub fn candidates(base_dir: &Path, name: &str) -> Vec<PathBuf> {
    let name = super::normalize_separators(name);
    let stem = strip_extension(&name);
    WAVE_EXTENSIONS
        .iter()
        .map(|ext| base_dir.join(format!("{stem}{ext}")))
        .collect()
}

fn strip_extension(name: &str) -> &str {
    let file_start = name.rfind('/').map_or(0, |slash| slash + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => &name[..file_start + dot],
        None => name,
    }
}

/// Decodes `path` by extension and converts it to `format`.
pub fn decode(path: &Path, format: WaveFormat) -> Result<WaveAsset> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let pcm = match ext.as_str() {
        "wav" => decode_wav(path),
        "ogg" => decode_ogg(path),
        "mp3" => decode_mp3(path),
        _ => Err(format!("unsupported audio format .{ext}")),
    }
    .map_err(|reason| RenderError::WaveDecode {
        path: path.to_path_buf(),
        reason,
    })?;

    let samples = pcm
        .with_channels(format.channels)
        .with_sample_rate(format.sample_rate)
        .quantize();
    Ok(WaveAsset::new(format, samples))
}

type DecodeResult<T> = std::result::Result<T, String>;

/// Intermediate decoder output in the source file's own format.
#[derive(Debug, Clone)]
struct Pcm {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl Pcm {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Mono is duplicated, downmix to mono averages, anything else maps
    /// target channel `c` to source channel `c % source_channels`.
    fn with_channels(self, target: u16) -> Self {
        if target == self.channels {
            return self;
        }
        let (src, dst) = (self.channels as usize, target as usize);
        let mut out = Vec::with_capacity(self.frames() * dst);
        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                out.push(frame.iter().sum::<f32>() / src as f32);
            } else {
                out.extend((0..dst).map(|c| frame[c % src]));
            }
        }
        Self {
            samples: out,
            channels: target,
            sample_rate: self.sample_rate,
        }
    }

    fn with_sample_rate(self, target: u32) -> Self {
        if target == self.sample_rate {
            return self;
        }
        let ch = self.channels as usize;
        let src_rate = u64::from(self.sample_rate);
        let dst_rate = u64::from(target);
        let src_frames = self.frames();
        let dst_frames = (src_frames as u64 * dst_rate / src_rate) as usize;

        let mut out = Vec::with_capacity(dst_frames * ch);
        for i in 0..dst_frames as u64 {
            let pos = (i * src_rate / dst_rate) as usize;
            let frac = ((i * src_rate) % dst_rate) as f32 / dst_rate as f32;
            let next = (pos + 1).min(src_frames - 1);
            for c in 0..ch {
                let a = self.samples[pos * ch + c];
                let b = self.samples[next * ch + c];
                out.push(a + (b - a) * frac);
            }
        }
        Self {
            samples: out,
            channels: self.channels,
            sample_rate: target,
        }
    }

    fn quantize(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
            .collect()
    }
}

fn checked(samples: Vec<f32>, channels: u16, sample_rate: u32) -> DecodeResult<Pcm> {
    if channels == 0 || sample_rate == 0 {
        return Err("stream declares no channels or no sample rate".into());
    }
    Ok(Pcm {
        samples,
        channels,
        sample_rate,
    })
}

fn decode_wav(path: &Path) -> DecodeResult<Pcm> {
    let reader = hound::WavReader::open(path).map_err(|err| err.to_string())?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| err.to_string())?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| err.to_string())?
        }
    };
    checked(samples, spec.channels, spec.sample_rate)
}

fn decode_ogg(path: &Path) -> DecodeResult<Pcm> {
    let file = File::open(path).map_err(|err| err.to_string())?;
    let mut reader = lewton::inside_ogg::OggStreamReader::new(BufReader::new(file))
        .map_err(|err| err.to_string())?;
    let channels = u16::from(reader.ident_hdr.audio_channels);
    let sample_rate = reader.ident_hdr.audio_sample_rate;

    let mut samples = Vec::new();
    while let Some(packet) = reader.read_dec_packet_itl().map_err(|err| err.to_string())? {
        samples.extend(packet.into_iter().map(|s| f32::from(s) / 32768.0));
    }
    checked(samples, channels, sample_rate)
}

fn decode_mp3(path: &Path) -> DecodeResult<Pcm> {
    let file = File::open(path).map_err(|err| err.to_string())?;
    let mut decoder = minimp3::Decoder::new(BufReader::new(file));
    let mut samples = Vec::new();
    let mut channels = 0u16;
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if channels == 0 {
                    channels = frame.channels as u16;
                    sample_rate = frame.sample_rate as u32;
                }
                samples.extend(frame.data.into_iter().map(|s| f32::from(s) / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(err) => return Err(format!("{err:?}")),
        }
    }
    checked(samples, channels, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn stereo_44k() -> WaveFormat {
        WaveFormat {
            channels: 2,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn matching_format_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        let samples = [0, 1, -1, 32767, -32768, 1234];
        write_wav(&path, 2, 44_100, &samples);

        let wave = decode(&path, stereo_44k()).unwrap();
        assert_eq!(wave.samples, samples);
        assert_eq!(wave.frame_count(), 3);
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 44_100, &[100, -200]);

        let wave = decode(&path, stereo_44k()).unwrap();
        assert_eq!(wave.samples, vec![100, 100, -200, -200]);
    }

    #[test]
    fn upsampling_interpolates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("low.wav");
        write_wav(&path, 1, 22_050, &[0, 1000, 2000]);

        let format = WaveFormat {
            channels: 1,
            sample_rate: 44_100,
        };
        let wave = decode(&path, format).unwrap();
        assert_eq!(wave.samples, vec![0, 500, 1000, 1500, 2000, 2000]);
    }

    #[test]
    fn resolves_alternate_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("kick.wav"), 2, 44_100, &[7, 7]);

        let wave = load(dir.path(), "kick.ogg", stereo_44k()).unwrap();
        assert_eq!(wave.samples, vec![7, 7]);
    }

    #[test]
    fn candidate_order_prefers_ogg() {
        let paths = candidates(Path::new("/song"), "sub\\snare.wav");
        assert_eq!(paths[0], Path::new("/song/sub/snare.ogg"));
        assert_eq!(paths[1], Path::new("/song/sub/snare.wav"));
        assert_eq!(paths.len(), 6);
    }

    #[test]
    fn dots_in_directories_are_not_extensions() {
        assert_eq!(strip_extension("pack.v2/kick"), "pack.v2/kick");
        assert_eq!(strip_extension("pack.v2/kick.wav"), "pack.v2/kick");
    }

    #[test]
    fn undecodable_candidate_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.wav"), b"RIFF????").unwrap();

        let err = load(dir.path(), "bad.wav", stereo_44k()).unwrap_err();
        assert!(matches!(err, RenderError::WaveDecode { .. }));
    }
}
