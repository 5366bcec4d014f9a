/// Chart resolution: every beat is split into this many ticks.
pub const TICKS_PER_BEAT: u32 = 48;

/// Converts tempo-relative tick deltas into wall-clock seconds under a
/// piecewise-constant tempo map.
#[derive(Debug, Clone)]
pub struct TickClock {
    tempo_bpm: f64,
    time_seconds: f64,
}

impl TickClock {
    pub fn new(initial_tempo_bpm: f64) -> Self {
        Self {
            tempo_bpm: initial_tempo_bpm,
            time_seconds: 0.0,
        }
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm
    }

    /// Total elapsed time since the start of the chart.
    pub fn time_seconds(&self) -> f64 {
        self.time_seconds
    }

    /// Advances by `delta_ticks` at the current tempo and returns the
    /// seconds that elapsed.
    pub fn advance(&mut self, delta_ticks: u64) -> f64 {
        let elapsed = delta_ticks as f64 * 60.0 / (TICKS_PER_BEAT as f64 * self.tempo_bpm);
        self.time_seconds += elapsed;
        elapsed
    }

    /// Advances by wall-clock time directly, independent of tempo.
    pub fn advance_seconds(&mut self, seconds: f64) {
        self.time_seconds += seconds;
    }

    /// Applies to subsequent advances only.
    pub fn set_tempo(&mut self, tempo_bpm: f64) {
        self.tempo_bpm = tempo_bpm;
    }
}
