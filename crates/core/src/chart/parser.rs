use std::collections::HashMap;

use super::{
    AssetTables, ChartEvent, ChartMeta, Diagnostic, EventKind, EventSequence, ParsedChart,
};
use crate::timeline::TICKS_PER_BEAT;

const BEATS_PER_MEASURE: u32 = 4;

/// Longest accepted `#xxx02` measure length, in whole measures.
const MAX_MEASURE_LENGTH: f64 = 1024.0;

/// Header commands that are valid BMS but carry nothing the renderer uses.
const IGNORED_HEADERS: &[&str] = &[
    "PLAYER",
    "SUBTITLE",
    "SUBARTIST",
    "PLAYLEVEL",
    "DIFFICULTY",
    "RANK",
    "DEFEXRANK",
    "TOTAL",
    "VOLWAV",
    "STAGEFILE",
    "BANNER",
    "BACKBMP",
    "PREVIEW",
    "LNTYPE",
    "LNOBJ",
    "MAKER",
    "COMMENT",
];

/// Decodes chart bytes as UTF-8 (with or without BOM), falling back to
/// Shift_JIS. Returns `None` when neither decodes cleanly.
pub fn decode_text(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);
    if let Ok(text) = std::str::from_utf8(raw) {
        return Some(text.to_string());
    }

    let (decoded, _, had_errors) = encoding_rs::SHIFT_JIS.decode(raw);
    if had_errors {
        None
    } else {
        Some(decoded.into_owned())
    }
}

/// Parses BMS text into a sorted event sequence, asset tables and metadata.
///
/// Problems in the text never fail the parse; they are reported as
/// diagnostics and the offending line or object is dropped.
pub fn parse(text: &str) -> ParsedChart {
    let mut parser = Parser::default();
    for (index, line) in text.lines().enumerate() {
        parser.line(index + 1, line.trim());
    }
    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Bgm,
    Tempo,
    BgaBase,
    BgaLayer,
    ExtendedTempo,
    Key,
    LongKey(u8),
}

impl Channel {
    fn from_code(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        match (bytes[0], bytes[1]) {
            (b'0', b'1') => Some(Self::Bgm),
            (b'0', b'3') => Some(Self::Tempo),
            (b'0', b'4') => Some(Self::BgaBase),
            (b'0', b'7') => Some(Self::BgaLayer),
            (b'0', b'8') => Some(Self::ExtendedTempo),
            (b'1' | b'2', b'1'..=b'9') => Some(Self::Key),
            (side @ (b'5' | b'6'), lane @ b'1'..=b'9') => {
                Some(Self::LongKey((side - b'5') * 9 + (lane - b'1')))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct RawObject {
    line: usize,
    measure: u32,
    index: u64,
    count: u64,
    channel: Channel,
    code: [u8; 2],
}

struct RandomBlock {
    value: i64,
    active: bool,
}

#[derive(Default)]
struct Parser {
    meta: ChartMeta,
    tables: AssetTables,
    diagnostics: Vec<Diagnostic>,
    objects: Vec<RawObject>,
    measure_lengths: HashMap<u32, f64>,
    extended_tempos: HashMap<usize, f64>,
    random_stack: Vec<RandomBlock>,
    warned_stop: bool,
}

impl Parser {
    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line,
            message: message.into(),
        });
    }

    fn line(&mut self, number: usize, line: &str) {
        let Some(rest) = line.strip_prefix('#') else {
            return;
        };

        let (key, value) = match rest.find(char::is_whitespace) {
            Some(split) => (&rest[..split], rest[split..].trim()),
            None => (rest, ""),
        };
        let key_upper = key.to_ascii_uppercase();

        if self.control_flow(number, &key_upper, value) {
            return;
        }
        if self.random_stack.iter().any(|block| !block.active) {
            return;
        }

        if is_channel_line(rest) {
            self.channel_line(number, rest);
        } else {
            self.header(number, &key_upper, value);
        }
    }

    /// Handles `#RANDOM` blocks. The generator always yields 1 so repeated
    /// renders of the same chart stay byte-identical.
    fn control_flow(&mut self, number: usize, key: &str, value: &str) -> bool {
        match key {
            "RANDOM" | "SETRANDOM" => {
                if value.parse::<i64>().is_err() {
                    self.warn(number, format!("invalid #{key} bound `{value}`"));
                }
                self.random_stack.push(RandomBlock {
                    value: 1,
                    active: true,
                });
            }
            "IF" => match self.random_stack.last_mut() {
                Some(block) => block.active = value.parse::<i64>().ok() == Some(block.value),
                None => self.warn(number, "#IF outside of #RANDOM"),
            },
            "ENDIF" => {
                if let Some(block) = self.random_stack.last_mut() {
                    block.active = true;
                }
            }
            "ENDRANDOM" => {
                if self.random_stack.pop().is_none() {
                    self.warn(number, "#ENDRANDOM without #RANDOM");
                }
            }
            _ => return false,
        }
        true
    }

    fn header(&mut self, number: usize, key: &str, value: &str) {
        match key {
            "TITLE" => self.meta.title = value.to_string(),
            "ARTIST" => self.meta.artist = value.to_string(),
            "GENRE" => self.meta.genre = value.to_string(),
            "BPM" => match value.parse::<f64>() {
                Ok(bpm) if bpm > 0.0 => self.meta.initial_tempo = bpm,
                _ => self.warn(number, format!("invalid initial tempo `{value}`")),
            },
            _ => {
                if let Some(id) = slot_suffix(key, "BPM") {
                    match value.parse::<f64>() {
                        Ok(bpm) if bpm > 0.0 => {
                            self.extended_tempos.insert(id, bpm);
                        }
                        _ => self.warn(number, format!("invalid tempo `{value}` for #{key}")),
                    }
                } else if let Some(id) = slot_suffix(key, "WAV") {
                    self.table_entry(number, key, value, id, false);
                } else if let Some(id) = slot_suffix(key, "BMP") {
                    self.table_entry(number, key, value, id, true);
                } else if slot_suffix(key, "STOP").is_none() && !IGNORED_HEADERS.contains(&key) {
                    self.warn(number, format!("unrecognized command #{key}"));
                }
            }
        }
    }

    fn table_entry(&mut self, number: usize, key: &str, value: &str, id: usize, bitmap: bool) {
        if value.is_empty() {
            self.warn(number, format!("#{key} has no file name"));
            return;
        }
        let table = if bitmap {
            &mut self.tables.bmp
        } else {
            &mut self.tables.wav
        };
        table.insert(id, value.to_string());
    }

    fn channel_line(&mut self, number: usize, rest: &str) {
        let measure: u32 = match rest[..3].parse() {
            Ok(measure) => measure,
            Err(_) => return self.warn(number, "malformed measure number"),
        };
        let code = rest[3..5].to_ascii_uppercase();
        let data = rest[6..].trim();

        if code == "02" {
            match data.parse::<f64>() {
                Ok(length) if length > 0.0 && length <= MAX_MEASURE_LENGTH => {
                    self.measure_lengths.insert(measure, length);
                }
                Ok(length) if length > MAX_MEASURE_LENGTH => self.warn(
                    number,
                    format!("measure length `{data}` exceeds {MAX_MEASURE_LENGTH}"),
                ),
                _ => self.warn(number, format!("invalid measure length `{data}`")),
            }
            return;
        }

        let Some(channel) = Channel::from_code(&code) else {
            if code == "09" && !self.warned_stop {
                self.warned_stop = true;
                self.warn(number, "STOP sequences are ignored");
            }
            return;
        };

        let data: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        if data.len() % 2 != 0 {
            self.warn(number, "channel data has odd length, last digit dropped");
        }
        if !data.iter().all(u8::is_ascii_alphanumeric) {
            return self.warn(number, "channel data contains non base-36 digits");
        }

        let count = (data.len() / 2) as u64;
        for (index, pair) in data.chunks_exact(2).enumerate() {
            if pair == b"00" {
                continue;
            }
            self.objects.push(RawObject {
                line: number,
                measure,
                index: index as u64,
                count,
                channel,
                code: [pair[0], pair[1]],
            });
        }
    }

    fn finish(mut self) -> ParsedChart {
        let measure_ticks = f64::from(TICKS_PER_BEAT * BEATS_PER_MEASURE);
        let last_measure = self.objects.iter().map(|o| o.measure).max().unwrap_or(0);
        let mut measure_starts = Vec::with_capacity(last_measure as usize + 1);
        let mut start = 0u64;
        for measure in 0..=last_measure {
            measure_starts.push(start);
            let length = self.measure_lengths.get(&measure).copied().unwrap_or(1.0);
            start = start.saturating_add((measure_ticks * length).round() as u64);
        }

        let mut placed: Vec<(u64, RawObject)> = std::mem::take(&mut self.objects)
            .into_iter()
            .map(|object| {
                let m = object.measure as usize;
                let span = measure_starts.get(m + 1).copied().unwrap_or(start) - measure_starts[m];
                let (index, count) = (u128::from(object.index), u128::from(object.count));
                let offset = (2 * index * u128::from(span) + count) / (2 * count);
                let offset = u64::try_from(offset).unwrap_or(span);
                (measure_starts[m].saturating_add(offset), object)
            })
            .collect();
        placed.sort_by_key(|(pos, _)| *pos);

        let mut events = Vec::with_capacity(placed.len());
        let mut open_long: HashMap<u8, usize> = HashMap::new();
        for (pos, object) in placed {
            let kind = match object.channel {
                Channel::Tempo => {
                    let hex = std::str::from_utf8(&object.code)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok());
                    match hex {
                        Some(bpm) => EventKind::TempoChange {
                            bpm: f64::from(bpm),
                        },
                        None => {
                            self.warn(object.line, "tempo channel value is not hexadecimal");
                            continue;
                        }
                    }
                }
                Channel::ExtendedTempo => {
                    let id = base36_pair(object.code);
                    match self.extended_tempos.get(&id).copied() {
                        Some(bpm) => EventKind::TempoChange { bpm },
                        None => {
                            let message = format!("undefined tempo #BPM{}", code_str(object.code));
                            self.warn(object.line, message);
                            continue;
                        }
                    }
                }
                Channel::Bgm | Channel::Key => EventKind::Note {
                    slot: base36_pair(object.code),
                },
                Channel::BgaBase => EventKind::BgaBaseChange {
                    slot: base36_pair(object.code),
                },
                Channel::BgaLayer => EventKind::BgaLayerChange {
                    slot: base36_pair(object.code),
                },
                Channel::LongKey(lane) => {
                    if open_long.remove(&lane).is_some() {
                        continue;
                    }
                    open_long.insert(lane, object.line);
                    EventKind::NoteLong {
                        slot: base36_pair(object.code),
                    }
                }
            };
            events.push(ChartEvent::new(pos, kind));
        }

        let mut dangling: Vec<usize> = open_long.into_values().collect();
        dangling.sort_unstable();
        for line in dangling {
            self.warn(line, "long note has no end");
        }
        self.diagnostics.sort_by_key(|d| d.line);

        ParsedChart {
            events: EventSequence::new(events),
            tables: self.tables,
            meta: self.meta,
            diagnostics: self.diagnostics,
        }
    }
}

/// `#MMMCC:` with a decimal measure and a two-digit channel.
fn is_channel_line(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() >= 6
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && bytes[3..5].iter().all(u8::is_ascii_alphanumeric)
        && bytes[5] == b':'
}

/// Parses `KEYxx` into the slot named by the two base-36 digits `xx`.
fn slot_suffix(key: &str, prefix: &str) -> Option<usize> {
    let digits = key.strip_prefix(prefix)?.as_bytes();
    if digits.len() != 2 || !digits.iter().all(u8::is_ascii_alphanumeric) {
        return None;
    }
    Some(base36_pair([digits[0], digits[1]]))
}

fn base36_pair(code: [u8; 2]) -> usize {
    base36_digit(code[0]) * 36 + base36_digit(code[1])
}

fn base36_digit(b: u8) -> usize {
    match b {
        b'0'..=b'9' => (b - b'0') as usize,
        b'A'..=b'Z' => (b - b'A' + 10) as usize,
        b'a'..=b'z' => (b - b'a' + 10) as usize,
        _ => 0,
    }
}

fn code_str(code: [u8; 2]) -> String {
    String::from_utf8_lossy(&code).to_ascii_uppercase()
}
