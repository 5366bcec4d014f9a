use std::io::Write;

use super::{RenderState, Synthesizer, BOUNDARY_EPSILON};
use crate::{
    assets::{SlotTable, WaveAsset, WaveFormat},
    chart::SLOT_COUNT,
    RenderError, Result,
};

/// Longest run of sample-frames mixed in one pass. Longer windows are split
/// so the scratch buffers stay bounded however far apart events are.
const MIX_CHUNK_FRAMES: usize = 4096;

/// Sums every playing keysound into interleaved little-endian PCM16.
///
/// Each slot has at most one voice; its cursor is the next unread
/// sample-frame, or `None` when the slot is silent.
#[derive(Debug)]
pub struct AudioMixer {
    waves: SlotTable<WaveAsset>,
    cursors: Vec<Option<usize>>,
    format: WaveFormat,
    mix: Vec<i32>,
    bytes: Vec<u8>,
}

impl AudioMixer {
    pub fn new(waves: SlotTable<WaveAsset>, format: WaveFormat) -> Result<Self> {
        if let Some((slot, wave)) = waves.loaded().find(|(_, wave)| wave.format != format) {
            return Err(RenderError::msg(format!(
                "wave in slot {slot} is {:?}, mixer expects {format:?}",
                wave.format
            )));
        }
        Ok(Self {
            waves,
            cursors: vec![None; SLOT_COUNT],
            format,
            mix: Vec::new(),
            bytes: Vec::new(),
        })
    }

    pub fn cursor(&self, slot: usize) -> Option<usize> {
        self.cursors.get(slot).copied().flatten()
    }

    pub fn active_voices(&self) -> usize {
        self.cursors.iter().filter(|cursor| cursor.is_some()).count()
    }

    /// Mixes the next `count` sample-frames of every voice into `self.bytes`.
    fn mix_chunk(&mut self, count: usize) {
        let ch = self.format.channels as usize;

        self.mix.clear();
        self.mix.resize(count * ch, 0);
        for (slot, cursor) in self.cursors.iter_mut().enumerate() {
            let Some(start) = *cursor else {
                continue;
            };
            let Some(wave) = self.waves.get(slot) else {
                *cursor = None;
                continue;
            };

            let frames = wave.frame_count();
            let take = count.min(frames.saturating_sub(start));
            let voice = &wave.samples[start * ch..(start + take) * ch];
            for (acc, &sample) in self.mix.iter_mut().zip(voice) {
                *acc += i32::from(sample);
            }

            let next = start + take;
            *cursor = (next < frames).then_some(next);
        }

        self.bytes.clear();
        self.bytes.reserve(self.mix.len() * 2);
        for &acc in &self.mix {
            let sample = (acc >> 1).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            self.bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

impl Synthesizer for AudioMixer {
    fn advance(&mut self, state: &mut RenderState, sink: &mut dyn Write) -> Result<()> {
        let rate = f64::from(self.format.sample_rate);
        let boundary = (state.time_seconds() * rate - BOUNDARY_EPSILON).floor() as i64;
        let count = match usize::try_from(boundary - state.samples as i64) {
            Ok(count) if count > 0 => count,
            _ => return Ok(()),
        };

        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(MIX_CHUNK_FRAMES);
            self.mix_chunk(chunk);
            sink.write_all(&self.bytes)?;
            state.samples += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Restarts `slot` from its first frame, cutting off any instance still
    /// playing. Absent slots stay silent.
    fn trigger(&mut self, slot: usize) {
        if self.waves.get(slot).is_some() {
            self.cursors[slot] = Some(0);
        }
    }

    fn is_ringing(&self) -> bool {
        self.cursors.iter().any(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartEvent, EventKind, EventSequence};
    use crate::render::dispatch;

    const MONO_1K: WaveFormat = WaveFormat {
        channels: 1,
        sample_rate: 1000,
    };

    fn mixer(waves: Vec<(usize, Vec<i16>)>, format: WaveFormat) -> AudioMixer {
        let mut table = SlotTable::new();
        for (slot, samples) in waves {
            table.insert(slot, WaveAsset::new(format, samples));
        }
        AudioMixer::new(table, format).unwrap()
    }

    fn decode(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Moves virtual time to `seconds` and returns the samples emitted.
    fn run_to(mixer: &mut AudioMixer, state: &mut RenderState, seconds: f64) -> Vec<i16> {
        state.clock.advance_seconds(seconds - state.time_seconds());
        let mut out = Vec::<u8>::new();
        mixer.advance(state, &mut out).unwrap();
        decode(&out)
    }

    #[test]
    fn halves_without_clipping_two_voices() {
        let mut mixer = mixer(vec![(1, vec![20_000; 100]), (2, vec![20_000; 100])], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);
        mixer.trigger(2);

        let out = run_to(&mut mixer, &mut state, 0.0105);
        assert_eq!(out, vec![20_000; 10]);
    }

    #[test]
    fn saturates_after_halving() {
        let loud = vec![
            (1, vec![32_000; 10]),
            (2, vec![32_000; 10]),
            (3, vec![32_000; 10]),
            (4, vec![-32_768; 10]),
            (5, vec![-32_768; 10]),
            (6, vec![-32_768; 10]),
        ];
        let mut mixer = mixer(loud, MONO_1K);
        let mut state = RenderState::new(120.0);
        for slot in 1..=3 {
            mixer.trigger(slot);
        }
        assert_eq!(run_to(&mut mixer, &mut state, 0.0025), vec![32_767; 2]);

        for slot in 4..=6 {
            mixer.trigger(slot);
        }
        // Positive voices still play: 3 * 32000 - 3 * 32768 = -2304, halved.
        assert_eq!(run_to(&mut mixer, &mut state, 0.0045), vec![-1152; 2]);
    }

    #[test]
    fn emits_little_endian_interleaved_frames() {
        let stereo = WaveFormat {
            channels: 2,
            sample_rate: 1000,
        };
        let mut mixer = mixer(vec![(7, vec![0x0102, -2])], stereo);
        let mut state = RenderState::new(120.0);
        mixer.trigger(7);

        state.clock.advance_seconds(0.0015);
        let mut out = Vec::<u8>::new();
        mixer.advance(&mut state, &mut out).unwrap();

        // 0x0102 / 2 = 0x0081, -2 / 2 = -1.
        assert_eq!(out, vec![0x81, 0x00, 0xFF, 0xFF]);
        assert_eq!(state.samples, 1);
        assert_eq!(mixer.cursor(7), None);
    }

    #[test]
    fn frame_on_the_boundary_belongs_to_the_next_window() {
        let ramp: Vec<i16> = (0..100).map(|i| i * 2).collect();
        let mut mixer = mixer(vec![(1, ramp)], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);

        let first = run_to(&mut mixer, &mut state, 0.01);
        assert_eq!(first, (0..9).collect::<Vec<i16>>());
        assert_eq!(state.samples, 9);

        let second = run_to(&mut mixer, &mut state, 0.02);
        assert_eq!(second, (9..19).collect::<Vec<i16>>());
        assert_eq!(mixer.cursor(1), Some(19));
    }

    #[test]
    fn long_window_is_mixed_in_bounded_chunks() {
        let mut mixer = mixer(vec![(1, vec![6; 10_000]), (2, vec![2; 5_000])], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);
        mixer.trigger(2);

        let out = run_to(&mut mixer, &mut state, 12.0005);

        assert_eq!(out.len(), 12_000);
        assert!(out[..5_000].iter().all(|&s| s == 4));
        assert!(out[5_000..10_000].iter().all(|&s| s == 3));
        assert!(out[10_000..].iter().all(|&s| s == 0));
        assert!(mixer.mix.capacity() <= MIX_CHUNK_FRAMES);
        assert!(!mixer.is_ringing());
    }

    #[test]
    fn window_ending_mid_voice_advances_cursor() {
        let mut mixer = mixer(vec![(1, vec![2; 100])], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);

        let out = run_to(&mut mixer, &mut state, 0.0405);
        assert_eq!(out.len(), 40);
        assert_eq!(mixer.cursor(1), Some(40));
    }

    #[test]
    fn short_voice_leaves_rest_of_window_silent() {
        let mut mixer = mixer(vec![(1, vec![10; 3])], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);

        let out = run_to(&mut mixer, &mut state, 0.0055);
        assert_eq!(out, vec![5, 5, 5, 0, 0]);
        assert!(!mixer.is_ringing());
    }

    #[test]
    fn retrigger_restarts_from_zero() {
        let mut samples = vec![100; 5000];
        samples.extend(std::iter::repeat(7000).take(5000));
        let mut mixer = mixer(vec![(1, samples)], MONO_1K);
        let mut state = RenderState::new(120.0);
        mixer.trigger(1);

        run_to(&mut mixer, &mut state, 5.0005);
        assert_eq!(mixer.cursor(1), Some(5000));

        mixer.trigger(1);
        assert_eq!(mixer.cursor(1), Some(0));
        let out = run_to(&mut mixer, &mut state, 6.0005);
        assert_eq!(out, vec![50; 1000]);
    }

    #[test]
    fn absent_slot_note_is_silent() {
        let mut mixer = mixer(vec![], MONO_1K);
        mixer.trigger(12);
        assert!(!mixer.is_ringing());
        mixer.trigger(SLOT_COUNT + 5);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn drain_plays_tail_after_last_event() {
        let mut mixer = mixer(vec![(1, vec![4; 3000])], MONO_1K);
        let events = EventSequence::new(vec![ChartEvent::new(0, EventKind::Note { slot: 1 })]);
        let mut out = Vec::<u8>::new();

        let state = dispatch(&events, 120.0, &mut mixer, &mut out).unwrap();

        let samples = decode(&out);
        assert_eq!(samples.len() as u64, state.samples);
        assert!(state.samples >= 3000 && state.samples < 3000 + 40);
        assert!(samples[..3000].iter().all(|&s| s == 2));
        assert!(samples[3000..].iter().all(|&s| s == 0));
        assert!(!mixer.is_ringing());
    }

    #[test]
    fn long_note_start_sounds_through_dispatch() {
        let mut mixer = mixer(vec![(3, vec![8; 500])], MONO_1K);
        let events = EventSequence::new(vec![
            ChartEvent::new(0, EventKind::BgaBaseChange { slot: 1 }),
            ChartEvent::new(24, EventKind::NoteLong { slot: 3 }),
        ]);
        let mut out = Vec::<u8>::new();

        let state = dispatch(&events, 120.0, &mut mixer, &mut out).unwrap();

        // 24 ticks at 120 BPM: the voice starts on frame 249.
        let samples = decode(&out);
        assert_eq!(samples.len() as u64, state.samples);
        assert!(samples.len() >= 249 + 500);
        assert!(samples[..249].iter().all(|&s| s == 0));
        assert!(samples[249..749].iter().all(|&s| s == 4));
        assert!(samples[749..].iter().all(|&s| s == 0));
        assert!(!mixer.is_ringing());
    }

    #[test]
    fn rejects_mismatched_wave_format() {
        let mut table = SlotTable::new();
        table.insert(1, WaveAsset::new(MONO_1K, vec![0; 4]));
        let stereo = WaveFormat {
            channels: 2,
            sample_rate: 1000,
        };

        assert!(AudioMixer::new(table, stereo).is_err());
    }
}
